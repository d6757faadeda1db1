//! Frame layout.
//!
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ Length       │ Payload                  │
//! │ 4 bytes      │ length bytes             │
//! │ uint32 BE    │ (serialized Buffer)      │
//! └──────────────┴──────────────────────────┘
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Length prefix size in bytes.
pub const PREFIX_SIZE: usize = 4;

/// Decode a length prefix from the first 4 bytes of `buf`.
pub fn decode_prefix(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; PREFIX_SIZE] = buf.get(..PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Reject lengths above the ceiling.
pub fn validate_length(length: usize, max_frame_size: u32) -> Result<u32> {
    match u32::try_from(length) {
        Ok(length) if length <= max_frame_size => Ok(length),
        _ => Err(WireError::MalformedFrame(format!(
            "frame length {length} exceeds maximum {max_frame_size}"
        ))),
    }
}

/// Encode prefix and payload into one contiguous buffer.
///
/// A single write keeps the prefix and payload in the same TLS record when
/// they fit.
pub fn encode_frame(payload: &[u8], max_frame_size: u32) -> Result<BytesMut> {
    let length = validate_length(payload.len(), max_frame_size)?;
    let mut out = BytesMut::with_capacity(PREFIX_SIZE + payload.len());
    out.put_u32(length);
    out.put_slice(payload);
    Ok(out)
}
