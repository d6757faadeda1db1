//! Blocking, deadline-bounded byte channel over a connected socket.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::poll::wait_readable;
use super::{Channel, Socket, StagingQueue};
use crate::config::ChannelConfig;
use crate::error::{Result, WireError};

/// Duplex byte stream with exact-length, deadline-bounded reads.
///
/// The channel owns its socket; dropping the channel closes the descriptor.
/// Bytes that arrive before a read times out stay staged for the next call.
pub struct ByteChannel<S: Socket> {
    socket: S,
    staging: StagingQueue,
    read_chunk_size: usize,
    peer_closed: bool,
    /// Bytes still to be skipped before the next read.
    skip: usize,
}

impl<S: Socket> ByteChannel<S> {
    /// Wrap a connected socket with default settings.
    pub fn new(socket: S) -> Self {
        Self::with_config(socket, &ChannelConfig::default())
    }

    pub fn with_config(socket: S, config: &ChannelConfig) -> Self {
        Self {
            socket,
            staging: StagingQueue::with_capacity(config.staging_capacity),
            read_chunk_size: config.read_chunk_size.max(1),
            peer_closed: false,
            skip: 0,
        }
    }

    /// Read exactly `n` bytes.
    ///
    /// Returns `Ok(None)` if `timeout` elapses first; whatever arrived so far
    /// stays buffered. Returns [`WireError::ConnectionClosed`] once the peer
    /// has closed and fewer than `n` bytes remain.
    pub fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.apply_skip();
            if let Some(bytes) = self.staging.take_exact(n) {
                return Ok(Some(bytes));
            }
            if self.peer_closed {
                return Err(WireError::ConnectionClosed);
            }
            if !self.fill(deadline)? {
                return Ok(None);
            }
        }
    }

    /// Read whatever is buffered or arrives first, at least one byte.
    ///
    /// Returns `Ok(None)` if nothing arrives before `timeout`.
    pub fn read_available(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.apply_skip();
            if !self.staging.is_empty() {
                return Ok(Some(self.staging.take_all()));
            }
            if self.peer_closed {
                return Err(WireError::ConnectionClosed);
            }
            if !self.fill(deadline)? {
                return Ok(None);
            }
        }
    }

    /// Write all of `data`, blocking until the kernel has accepted it.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.socket.write_all(data).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => WireError::ConnectionClosed,
            _ => WireError::Io(e),
        })?;
        tracing::trace!("wrote {} bytes", data.len());
        Ok(())
    }

    /// Skip the next `n` bytes of the stream.
    ///
    /// Buffered bytes go at once; the rest are dropped by later reads as
    /// they arrive.
    pub fn discard(&mut self, n: usize) {
        self.skip = self.skip.saturating_add(n);
        self.apply_skip();
        if self.skip > 0 {
            tracing::debug!("skipping {} bytes still in flight", self.skip);
        }
    }

    fn apply_skip(&mut self) {
        if self.skip > 0 {
            self.skip -= self.staging.discard(self.skip);
        }
    }

    /// Bytes received but not yet returned by a read.
    pub fn buffered(&self) -> usize {
        self.staging.available()
    }

    /// Whether the peer has closed its side.
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Shut down both directions; a peer blocked in a read sees EOF.
    pub fn shutdown(&self) -> Result<()> {
        self.socket.shutdown_both()?;
        Ok(())
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Perform one socket read into the staging queue.
    ///
    /// Returns `Ok(false)` if the deadline passed with nothing readable.
    fn fill(&mut self, deadline: Instant) -> Result<bool> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !wait_readable(self.socket.as_raw_fd(), remaining)? {
                if Instant::now() >= deadline {
                    return Ok(false);
                }
                continue;
            }

            let mut slot = self.staging.reserve(self.read_chunk_size);
            match self.socket.read(slot.as_mut_slice()) {
                Ok(0) => {
                    drop(slot);
                    tracing::debug!("peer closed connection");
                    self.peer_closed = true;
                    return Ok(true);
                }
                Ok(n) => {
                    slot.commit(n);
                    tracing::trace!("read {} bytes", n);
                    return Ok(true);
                }
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    drop(slot);
                    tracing::debug!("peer reset connection");
                    self.peer_closed = true;
                    return Ok(true);
                }
                Err(e) => return Err(WireError::Io(e)),
            }
        }
    }
}

impl<S: Socket> Channel for ByteChannel<S> {
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        ByteChannel::read(self, n, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        ByteChannel::write(self, data)
    }

    fn discard(&mut self, n: usize) {
        ByteChannel::discard(self, n)
    }
}
