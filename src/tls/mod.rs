//! TLS record layer over a [`ByteChannel`].
//!
//! [`SecureChannel`] drives a rustls session by hand: ciphertext read from
//! the socket is cut into whole records by a [`RecordAssembler`], fed to a
//! [`TlsPump`], and the decrypted bytes land in a [`StagingQueue`] that reads
//! are served from. The handshake runs to completion inside the constructor.
//!
//! ```text
//! socket ──► ByteChannel ──► RecordAssembler ──► TlsPump ──► StagingQueue ──► read()
//! write() ──► TlsPump ──► ByteChannel ──► socket
//! ```

mod config;
mod pump;
mod record;

use std::time::{Duration, Instant};

use bytes::Bytes;
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, Connection, ServerConnection};

use crate::channel::{ByteChannel, Channel, Socket, StagingQueue};
use crate::error::{Result, WireError};

pub use config::{TlsConfig, TlsConfigBuilder};
pub use pump::{PumpOutput, TlsPump, TlsState};
pub use record::{RecordAssembler, RecordHeader, MAX_RECORD_FRAGMENT, RECORD_HEADER_SIZE};

#[cfg(test)]
pub(crate) mod test_ca;

/// Encrypted duplex stream with the same read/write contract as [`ByteChannel`].
pub struct SecureChannel<S: Socket> {
    inner: ByteChannel<S>,
    pump: TlsPump,
    records: RecordAssembler,
    plaintext: StagingQueue,
    /// Plaintext bytes still to be skipped before the next read.
    skip: usize,
}

impl<S: Socket> SecureChannel<S> {
    /// Connect as a TLS client, verifying the peer as `server_name`.
    ///
    /// Blocks until the handshake completes or `timeout` expires. Every
    /// failure, an expired deadline included, is a [`WireError::Handshake`]
    /// and the socket is dropped with the partially built session.
    pub fn client(
        channel: ByteChannel<S>,
        config: &TlsConfig,
        server_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| WireError::TlsConfig(format!("invalid server name {server_name:?}: {e}")))?;
        let conn = ClientConnection::new(config.client_config()?, name)?;
        Self::handshake(channel, conn.into(), timeout)
    }

    /// Accept a TLS client.
    pub fn server(channel: ByteChannel<S>, config: &TlsConfig, timeout: Duration) -> Result<Self> {
        let conn = ServerConnection::new(config.server_config()?)?;
        Self::handshake(channel, conn.into(), timeout)
    }

    fn handshake(inner: ByteChannel<S>, conn: Connection, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let mut channel = Self {
            inner,
            pump: TlsPump::new(conn),
            records: RecordAssembler::new(),
            plaintext: StagingQueue::new(),
            skip: 0,
        };
        let role = if channel.pump.is_client() { "client" } else { "server" };

        if let Err(e) = channel.drive_handshake(deadline, timeout) {
            tracing::warn!("TLS {} handshake failed: {}", role, e);
            channel.pump.abort();
            return Err(match e {
                WireError::Handshake(_) => e,
                WireError::Timeout(_) => {
                    WireError::Handshake(format!("deadline of {timeout:?} expired"))
                }
                WireError::ConnectionClosed => {
                    WireError::Handshake("peer closed during handshake".into())
                }
                other => WireError::Handshake(other.to_string()),
            });
        }

        tracing::debug!("TLS {} channel established", role);
        Ok(channel)
    }

    fn drive_handshake(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        let first = self.pump.step(&[])?;
        self.inner.write(&first.outbound)?;

        while self.pump.state() == TlsState::Handshaking {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inner.read_available(remaining)? {
                Some(ciphertext) => self.absorb(&ciphertext)?,
                None => return Err(WireError::Timeout(timeout)),
            }
        }

        match self.pump.state() {
            TlsState::Established => Ok(()),
            _ => Err(WireError::ConnectionClosed),
        }
    }

    /// Run ciphertext through the record assembler and the pump.
    fn absorb(&mut self, ciphertext: &[u8]) -> Result<()> {
        for record in self.records.push(ciphertext)? {
            let output = match self.pump.step(&record) {
                Ok(output) => output,
                Err(e) => {
                    let alert = self.pump.take_outbound();
                    if !alert.is_empty() {
                        if let Err(write_err) = self.inner.write(&alert) {
                            tracing::trace!("dropping TLS alert: {}", write_err);
                        }
                    }
                    return Err(e);
                }
            };
            if !output.outbound.is_empty() {
                self.inner.write(&output.outbound)?;
            }
            self.plaintext.append(&output.plaintext);
            if output.state == TlsState::Closed {
                break;
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: WireError) -> WireError {
        if err.is_fatal() && self.pump.state() != TlsState::Closed {
            tracing::debug!("closing TLS channel after fatal error: {}", err);
            self.pump.abort();
        }
        err
    }

    /// Read exactly `n` decrypted bytes.
    ///
    /// Same contract as [`ByteChannel::read`]: `Ok(None)` on timeout with
    /// partial plaintext kept, [`WireError::ConnectionClosed`] once the
    /// session is over and fewer than `n` bytes remain.
    pub fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.apply_skip();
            if let Some(bytes) = self.plaintext.take_exact(n) {
                return Ok(Some(bytes));
            }
            if self.pump.state() == TlsState::Closed {
                return Err(WireError::ConnectionClosed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inner.read_available(remaining) {
                Ok(Some(ciphertext)) => {
                    if let Err(e) = self.absorb(&ciphertext) {
                        return Err(self.fail(e));
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Encrypt and send all of `data`.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let ciphertext = self.pump.send(data).map_err(|e| self.fail(e))?;
        self.inner.write(&ciphertext).map_err(|e| self.fail(e))
    }

    /// Skip the next `n` decrypted bytes, buffered or still to arrive.
    pub fn discard(&mut self, n: usize) {
        self.skip = self.skip.saturating_add(n);
        self.apply_skip();
    }

    fn apply_skip(&mut self) {
        if self.skip > 0 {
            self.skip -= self.plaintext.discard(self.skip);
        }
    }

    /// Send `close_notify`; later reads and writes fail.
    pub fn close(&mut self) -> Result<()> {
        if self.pump.state() == TlsState::Closed {
            return Ok(());
        }
        let ciphertext = self.pump.close();
        tracing::debug!("sending close_notify");
        self.inner.write(&ciphertext)
    }

    pub fn state(&self) -> TlsState {
        self.pump.state()
    }

    /// Decrypted bytes waiting to be read.
    pub fn buffered(&self) -> usize {
        self.plaintext.available()
    }

    /// The underlying plain channel.
    pub fn get_ref(&self) -> &ByteChannel<S> {
        &self.inner
    }
}

impl<S: Socket> Channel for SecureChannel<S> {
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        SecureChannel::read(self, n, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        SecureChannel::write(self, data)
    }

    fn discard(&mut self, n: usize) {
        SecureChannel::discard(self, n)
    }
}

impl<S: Socket> std::fmt::Debug for SecureChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("pump", &self.pump)
            .field("buffered", &self.plaintext.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::test_ca::TestCa;
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn configs() -> (TlsConfig, TlsConfig) {
        let ca = TestCa::new();
        let (cert, key) = ca.issue("localhost");
        let client = TlsConfig::builder().ca_cert_pem(ca.pem()).build().unwrap();
        let server = TlsConfig::builder().cert_pem(cert).key_pem(key).build().unwrap();
        (client, server)
    }

    fn connected() -> (SecureChannel<UnixStream>, SecureChannel<UnixStream>) {
        let (client_config, server_config) = configs();
        let (a, b) = UnixStream::pair().unwrap();

        let server = thread::spawn(move || {
            SecureChannel::server(ByteChannel::new(b), &server_config, TIMEOUT).unwrap()
        });
        let client =
            SecureChannel::client(ByteChannel::new(a), &client_config, "localhost", TIMEOUT)
                .unwrap();
        (client, server.join().unwrap())
    }

    #[test]
    fn test_round_trip() {
        let (mut client, mut server) = connected();
        assert_eq!(client.state(), TlsState::Established);

        client.write(b"hello server").unwrap();
        let bytes = server.read(12, TIMEOUT).unwrap().unwrap();
        assert_eq!(&bytes[..], b"hello server");

        server.write(b"hi").unwrap();
        assert_eq!(&client.read(2, TIMEOUT).unwrap().unwrap()[..], b"hi");
    }

    #[test]
    fn test_leftover_plaintext_buffered() {
        let (mut client, mut server) = connected();
        client.write(b"abcdefgh").unwrap();

        assert_eq!(&server.read(3, TIMEOUT).unwrap().unwrap()[..], b"abc");
        assert_eq!(server.buffered(), 5);
        assert_eq!(&server.read(5, TIMEOUT).unwrap().unwrap()[..], b"defgh");
    }

    #[test]
    fn test_discard_skips_decrypted_bytes() {
        let (mut client, mut server) = connected();
        client.write(b"abc").unwrap();
        assert!(server.read(8, Duration::from_millis(50)).unwrap().is_none());

        server.discard(8);
        client.write(b"defgh").unwrap();
        client.write(b"next").unwrap();
        assert_eq!(&server.read(4, TIMEOUT).unwrap().unwrap()[..], b"next");
    }

    #[test]
    fn test_corrupt_record_reported_when_alert_cannot_be_sent() {
        let (client, mut server) = connected();
        let mut raw = client.get_ref().socket().try_clone().unwrap();
        let mut record = vec![23, 3, 3, 0, 32];
        record.extend([0x5A; 32]);
        raw.write_all(&record).unwrap();
        raw.shutdown(std::net::Shutdown::Both).unwrap();

        let err = server.read(1, TIMEOUT).unwrap_err();
        assert!(matches!(err, WireError::Tls(_)), "got {err:?}");
        assert_eq!(server.state(), TlsState::Closed);
        assert!(matches!(server.write(b"x"), Err(WireError::ConnectionClosed)));
    }

    #[test]
    fn test_read_timeout() {
        let (_client, mut server) = connected();
        let start = Instant::now();
        assert!(server.read(1, Duration::from_millis(50)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(server.state(), TlsState::Established);
    }

    #[test]
    fn test_close_notify_drains_then_closes() {
        let (mut client, mut server) = connected();
        client.write(b"bye").unwrap();
        client.close().unwrap();
        assert!(matches!(client.write(b"x"), Err(WireError::ConnectionClosed)));

        assert_eq!(&server.read(3, TIMEOUT).unwrap().unwrap()[..], b"bye");
        assert!(matches!(
            server.read(1, TIMEOUT),
            Err(WireError::ConnectionClosed)
        ));
        assert_eq!(server.state(), TlsState::Closed);
    }

    #[test]
    fn test_wrong_server_name_fails() {
        let (client_config, server_config) = configs();
        let (a, b) = UnixStream::pair().unwrap();

        let server = thread::spawn(move || {
            SecureChannel::server(ByteChannel::new(b), &server_config, TIMEOUT)
        });
        let result = SecureChannel::client(
            ByteChannel::new(a),
            &client_config,
            "other.example",
            TIMEOUT,
        );
        assert!(matches!(result, Err(WireError::Handshake(_))));
        assert!(server.join().unwrap().is_err());
    }

    #[test]
    fn test_peer_closes_mid_handshake() {
        let (client_config, _) = configs();
        let (a, mut b) = UnixStream::pair().unwrap();

        let peer = thread::spawn(move || {
            let mut hello = [0u8; 5];
            b.read_exact(&mut hello).unwrap();
            // Reply with half a record header, then hang up.
            b.write_all(&[22, 3]).unwrap();
        });
        let result = SecureChannel::client(ByteChannel::new(a), &client_config, "localhost", TIMEOUT);
        peer.join().unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, WireError::Handshake(_)), "got {err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_handshake_timeout() {
        let (_, server_config) = configs();
        let (_a, b) = UnixStream::pair().unwrap();
        let start = Instant::now();
        let result = SecureChannel::server(
            ByteChannel::new(b),
            &server_config,
            Duration::from_millis(100),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, WireError::Handshake(_)), "got {err:?}");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("deadline"));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_client_without_ca_is_config_error() {
        let (_, server_config) = configs();
        let (a, _b) = UnixStream::pair().unwrap();
        let result = SecureChannel::client(ByteChannel::new(a), &server_config, "localhost", TIMEOUT);
        assert!(matches!(result, Err(WireError::TlsConfig(_))));
    }
}
