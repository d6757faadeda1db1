//! Transaction framing - one serialized [`Buffer`] per length-prefixed frame.
//!
//! Works over any [`Channel`], plain or TLS. A transaction is a request frame
//! and, for request/response calls, one reply frame on the same channel.
//!
//! # Example
//!
//! ```no_run
//! use std::os::unix::net::UnixStream;
//! use std::time::Duration;
//!
//! use enclave_wire::channel::ByteChannel;
//! use enclave_wire::transaction;
//! use enclave_wire::Buffer;
//!
//! let stream = UnixStream::connect("/tmp/enclave-wire.sock")?;
//! let mut channel = ByteChannel::new(stream);
//!
//! let mut request = Buffer::new();
//! request.put("Command", "status");
//! let reply = transaction::put_transaction_and_get_response(
//!     &mut channel,
//!     &request,
//!     Duration::from_secs(5),
//! )?;
//! println!("{}", reply.get_str("Status")?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod frame;

use std::time::Duration;

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::channel::Channel;
use crate::config::TransactionConfig;
use crate::error::{Result, WireError};

pub use frame::{decode_prefix, encode_frame, validate_length, PREFIX_SIZE};

/// Frame reader/writer bound to a [`TransactionConfig`].
///
/// The free functions in this module use the default configuration.
#[derive(Debug, Clone, Default)]
pub struct Framer {
    config: TransactionConfig,
}

impl Framer {
    pub fn new(config: TransactionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Write `payload` as one frame.
    pub fn put_raw_frame<C: Channel + ?Sized>(&self, channel: &mut C, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload, self.config.max_frame_size)?;
        channel.write(&frame)?;
        tracing::trace!("sent frame ({} bytes)", payload.len());
        Ok(())
    }

    /// Read one frame's payload without decoding it.
    ///
    /// Returns `Ok(None)` if no length prefix arrives within `timeout`. Once
    /// the prefix is in, the payload gets its own `timeout`; missing it is a
    /// [`WireError::MalformedFrame`], as is a length above the ceiling. In
    /// both cases the declared payload is discarded from the channel, so the
    /// next call reads the following frame.
    pub fn get_raw_frame<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
        timeout: Duration,
    ) -> Result<Option<Bytes>> {
        let Some(prefix) = channel.read(PREFIX_SIZE, timeout)? else {
            return Ok(None);
        };
        let length = decode_prefix(&prefix)
            .ok_or_else(|| WireError::MalformedFrame("short length prefix".into()))?;

        if length > self.config.max_frame_size {
            tracing::warn!(
                "rejecting frame of {} bytes (maximum {})",
                length,
                self.config.max_frame_size
            );
            channel.discard(length as usize);
            return Err(WireError::MalformedFrame(format!(
                "frame length {length} exceeds maximum {}",
                self.config.max_frame_size
            )));
        }

        match channel.read(length as usize, timeout)? {
            Some(payload) => {
                tracing::trace!("received frame ({} bytes)", length);
                Ok(Some(payload))
            }
            None => {
                tracing::warn!("frame payload of {} bytes did not arrive in time", length);
                channel.discard(length as usize);
                Err(WireError::MalformedFrame(format!(
                    "payload of {length} bytes not received within {timeout:?}"
                )))
            }
        }
    }

    /// Serialize `buffer` and send it as one frame. Never waits for a reply.
    pub fn put_transaction<C: Channel + ?Sized>(&self, channel: &mut C, buffer: &Buffer) -> Result<()> {
        self.put_raw_frame(channel, &buffer.serialize())
    }

    /// Receive one frame and decode it.
    ///
    /// A payload that fails to decode is reported as
    /// [`WireError::MalformedBuffer`]; the frame was consumed, so the
    /// channel stays aligned and usable.
    pub fn get_transaction<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
        timeout: Duration,
    ) -> Result<Option<Buffer>> {
        let Some(payload) = self.get_raw_frame(channel, timeout)? else {
            return Ok(None);
        };
        match Buffer::from_bytes(payload) {
            Ok(buffer) => Ok(Some(buffer)),
            Err(e) => {
                tracing::debug!("discarding undecodable frame: {}", e);
                Err(e)
            }
        }
    }

    /// Send `request` and wait up to `timeout` for the reply frame.
    pub fn put_transaction_and_get_response<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
        request: &Buffer,
        timeout: Duration,
    ) -> Result<Buffer> {
        self.put_transaction(channel, request)?;
        self.get_transaction(channel, timeout)?
            .ok_or(WireError::Timeout(timeout))
    }
}

/// Serialize `buffer` and send it as one frame.
pub fn put_transaction<C: Channel + ?Sized>(channel: &mut C, buffer: &Buffer) -> Result<()> {
    Framer::default().put_transaction(channel, buffer)
}

/// Receive and decode one frame; `Ok(None)` if nothing arrives in time.
pub fn get_transaction<C: Channel + ?Sized>(
    channel: &mut C,
    timeout: Duration,
) -> Result<Option<Buffer>> {
    Framer::default().get_transaction(channel, timeout)
}

/// Request/response round trip; a missing reply is [`WireError::Timeout`].
pub fn put_transaction_and_get_response<C: Channel + ?Sized>(
    channel: &mut C,
    request: &Buffer,
    timeout: Duration,
) -> Result<Buffer> {
    Framer::default().put_transaction_and_get_response(channel, request, timeout)
}

/// Send an already-serialized payload as one frame.
pub fn put_raw_frame<C: Channel + ?Sized>(channel: &mut C, payload: &[u8]) -> Result<()> {
    Framer::default().put_raw_frame(channel, payload)
}

/// Receive one frame's payload without decoding it.
pub fn get_raw_frame<C: Channel + ?Sized>(
    channel: &mut C,
    timeout: Duration,
) -> Result<Option<Bytes>> {
    Framer::default().get_raw_frame(channel, timeout)
}
