//! Channel module - blocking byte streams with bounded-timeout reads.
//!
//! - [`ByteChannel`]: plain socket (TCP or Unix-domain)
//! - [`StagingQueue`]: reserve/commit byte queue that assembles partial reads
//! - [`Channel`]: the read/write contract shared with
//!   [`SecureChannel`](crate::tls::SecureChannel), used by transaction framing
//!
//! Every read either returns exactly the requested number of bytes, returns
//! `None` because its deadline passed, or fails. It never returns a prefix.

mod poll;
mod staging;
mod stream;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

pub use staging::{Reservation, StagingQueue};
pub use stream::ByteChannel;

/// Ordered duplex byte stream with exact-length, deadline-bounded reads.
pub trait Channel {
    /// Read exactly `n` bytes, or `Ok(None)` if `timeout` elapses first.
    ///
    /// Bytes received before a timeout are kept for the next call.
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>>;

    /// Write all of `data`. Blocks without a deadline.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Skip the next `n` bytes of the stream, buffered or not yet arrived.
    ///
    /// Later reads start after them. Used to step over a rejected frame.
    fn discard(&mut self, n: usize);
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).read(n, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn discard(&mut self, n: usize) {
        (**self).discard(n)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).read(n, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn discard(&mut self, n: usize) {
        (**self).discard(n)
    }
}

/// A connected stream socket a [`ByteChannel`] can own.
pub trait Socket: Read + Write + AsRawFd + Send {
    /// Shut down both directions of the connection.
    fn shutdown_both(&self) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl Socket for UnixStream {
    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}
