//! Socket-free TLS pump.
//!
//! Ciphertext goes in through [`TlsPump::step`]; ciphertext to transmit and
//! decrypted application bytes come out. Nothing here touches a descriptor,
//! so two pumps can be driven against each other in memory.

use std::io::{self, Read, Write};

use rustls::Connection;

use crate::error::{Result, WireError};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    Handshaking,
    Established,
    /// Terminal: a fatal error, a local close or a peer `close_notify`.
    Closed,
}

/// Result of one pump step.
#[derive(Debug)]
pub struct PumpOutput {
    /// Ciphertext to write to the peer.
    pub outbound: Vec<u8>,
    /// Application bytes decrypted from the inbound ciphertext.
    pub plaintext: Vec<u8>,
    /// State after the step.
    pub state: TlsState,
}

/// TLS session driven from memory buffers.
pub struct TlsPump {
    conn: Connection,
    state: TlsState,
}

impl TlsPump {
    pub fn new(conn: impl Into<Connection>) -> Self {
        Self {
            conn: conn.into(),
            state: TlsState::Handshaking,
        }
    }

    pub fn state(&self) -> TlsState {
        self.state
    }

    pub fn is_client(&self) -> bool {
        matches!(self.conn, Connection::Client(_))
    }

    /// Feed inbound ciphertext and collect everything it produces.
    ///
    /// An empty `inbound` just flushes pending output, which is how a client
    /// obtains its first flight. On a protocol error the pump enters
    /// [`TlsState::Closed`] and any alert rustls queued stays available
    /// through [`take_outbound`](Self::take_outbound).
    pub fn step(&mut self, inbound: &[u8]) -> Result<PumpOutput> {
        if self.state == TlsState::Closed {
            return Err(WireError::ConnectionClosed);
        }

        let mut plaintext = Vec::new();
        let mut rest = inbound;
        while !rest.is_empty() {
            let n = self.conn.read_tls(&mut rest)?;
            if n == 0 {
                break;
            }

            let io_state = match self.conn.process_new_packets() {
                Ok(io_state) => io_state,
                Err(e) => {
                    tracing::debug!("TLS protocol error: {}", e);
                    self.state = TlsState::Closed;
                    return Err(WireError::Tls(e));
                }
            };

            let pending = io_state.plaintext_bytes_to_read();
            if pending > 0 {
                let start = plaintext.len();
                plaintext.resize(start + pending, 0);
                self.conn.reader().read_exact(&mut plaintext[start..])?;
            }

            if io_state.peer_has_closed() {
                tracing::debug!("peer sent close_notify");
                self.state = TlsState::Closed;
                break;
            }
        }

        if self.state == TlsState::Handshaking && !self.conn.is_handshaking() {
            tracing::debug!(
                client = self.is_client(),
                version = ?self.conn.protocol_version(),
                "TLS handshake complete"
            );
            self.state = TlsState::Established;
        }

        let mut outbound = Vec::new();
        self.drain_outbound(&mut outbound)?;
        Ok(PumpOutput {
            outbound,
            plaintext,
            state: self.state,
        })
    }

    /// Encrypt application bytes, returning the ciphertext to transmit.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.state != TlsState::Established {
            return Err(WireError::ConnectionClosed);
        }

        let mut outbound = Vec::new();
        let mut rest = plaintext;
        while !rest.is_empty() {
            self.drain_outbound(&mut outbound)?;
            let n = self.conn.writer().write(rest)?;
            if n == 0 {
                return Err(WireError::Io(io::Error::from(io::ErrorKind::WriteZero)));
            }
            rest = &rest[n..];
        }
        self.drain_outbound(&mut outbound)?;
        Ok(outbound)
    }

    /// Queue `close_notify` and return the ciphertext that carries it.
    pub fn close(&mut self) -> Vec<u8> {
        if self.state != TlsState::Closed {
            self.conn.send_close_notify();
            self.state = TlsState::Closed;
        }
        self.take_outbound()
    }

    /// Drain whatever ciphertext is queued, including a final alert.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        let mut outbound = Vec::new();
        if let Err(e) = self.drain_outbound(&mut outbound) {
            tracing::trace!("discarding outbound TLS data: {}", e);
        }
        outbound
    }

    /// Mark the session dead without notifying the peer.
    pub fn abort(&mut self) {
        self.state = TlsState::Closed;
    }

    fn drain_outbound(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        while self.conn.wants_write() {
            if self.conn.write_tls(out)? == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TlsPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsPump")
            .field("client", &self.is_client())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::test_ca::TestCa;
    use crate::tls::TlsConfig;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConnection, ServerConnection};

    fn pumps() -> (TlsPump, TlsPump) {
        let ca = TestCa::new();
        let (cert, key) = ca.issue("localhost");
        let client_config = TlsConfig::builder().ca_cert_pem(ca.pem()).build().unwrap();
        let server_config = TlsConfig::builder().cert_pem(cert).key_pem(key).build().unwrap();

        let name = ServerName::try_from("localhost").unwrap();
        let client =
            ClientConnection::new(client_config.client_config().unwrap(), name).unwrap();
        let server = ServerConnection::new(server_config.server_config().unwrap()).unwrap();
        (TlsPump::new(client), TlsPump::new(server))
    }

    /// Shuttle flights until both sides are established.
    fn handshake(client: &mut TlsPump, server: &mut TlsPump) {
        let mut to_server = client.step(&[]).unwrap().outbound;
        assert!(!to_server.is_empty(), "client must send the first flight");

        for _ in 0..10 {
            let out = server.step(&to_server).unwrap();
            let to_client = out.outbound;
            let out = client.step(&to_client).unwrap();
            to_server = out.outbound;
            if client.state() == TlsState::Established
                && server.state() == TlsState::Established
                && to_server.is_empty()
            {
                return;
            }
        }
        panic!("handshake did not converge");
    }

    #[test]
    fn test_handshake_states() {
        let (mut client, mut server) = pumps();
        assert_eq!(client.state(), TlsState::Handshaking);
        assert!(client.is_client());
        assert!(!server.is_client());

        let hello = client.step(&[]).unwrap();
        assert_eq!(hello.state, TlsState::Handshaking);

        // Server cannot finish without the client's final flight.
        let reply = server.step(&hello.outbound).unwrap();
        assert!(!reply.outbound.is_empty());
        assert_eq!(server.state(), TlsState::Handshaking);

        let finished = client.step(&reply.outbound).unwrap();
        assert_eq!(finished.state, TlsState::Established);
        let done = server.step(&finished.outbound).unwrap();
        assert_eq!(done.state, TlsState::Established);
    }

    #[test]
    fn test_application_data_both_ways() {
        let (mut client, mut server) = pumps();
        handshake(&mut client, &mut server);

        let ciphertext = client.send(b"status request").unwrap();
        assert!(!ciphertext.windows(6).any(|w| w == b"status"));
        let out = server.step(&ciphertext).unwrap();
        assert_eq!(out.plaintext, b"status request");

        let ciphertext = server.send(b"ok").unwrap();
        let out = client.step(&ciphertext).unwrap();
        assert_eq!(out.plaintext, b"ok");
    }

    #[test]
    fn test_large_write_spans_records() {
        let (mut client, mut server) = pumps();
        handshake(&mut client, &mut server);

        let payload: Vec<u8> = (0..200_000u32).map(|i| i as u8).collect();
        let ciphertext = client.send(&payload).unwrap();

        let mut received = Vec::new();
        for chunk in ciphertext.chunks(7000) {
            received.extend(server.step(chunk).unwrap().plaintext);
        }
        assert_eq!(received, payload);
    }

    #[test]
    fn test_send_before_established() {
        let (mut client, _server) = pumps();
        assert!(matches!(
            client.send(b"early"),
            Err(WireError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_notify() {
        let (mut client, mut server) = pumps();
        handshake(&mut client, &mut server);

        let mut ciphertext = client.send(b"last words").unwrap();
        ciphertext.extend(client.close());
        assert_eq!(client.state(), TlsState::Closed);

        let out = server.step(&ciphertext).unwrap();
        assert_eq!(out.plaintext, b"last words");
        assert_eq!(out.state, TlsState::Closed);
        assert!(matches!(server.step(&[]), Err(WireError::ConnectionClosed)));
    }

    #[test]
    fn test_garbage_is_fatal() {
        let (_client, mut server) = pumps();
        // Application data before any ClientHello.
        let err = server.step(&[23, 3, 3, 0, 5, 1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, WireError::Tls(_)));
        assert_eq!(server.state(), TlsState::Closed);
        assert!(!server.take_outbound().is_empty(), "alert expected");
    }
}
