//! Element record layout.
//!
//! ```text
//! ┌──────────────┬────────┬──────────────┬─────────────────┐
//! │ Name hash    │ Type   │ Payload len  │ Payload         │
//! │ 8 bytes      │ 1 byte │ 4 bytes      │ len bytes       │
//! │ uint64 BE    │        │ uint32 BE    │                 │
//! └──────────────┴────────┴──────────────┴─────────────────┘
//! ```
//!
//! Fixed-width scalars write a length of 0 and their payload width is implied
//! by the type tag. A serialized buffer is the bare concatenation of records.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::element::{Element, ElementKey, ElementType};
use super::value::validate_payload;
use crate::error::{Result, WireError};

/// Record header size in bytes (8 + 1 + 4).
pub const RECORD_HEADER_SIZE: usize = 13;

/// Largest payload a record's length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

/// Reject payloads the record length field cannot describe.
pub(crate) fn check_payload_len(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_LEN {
        return Err(WireError::MalformedBuffer(format!(
            "payload of {len} bytes exceeds the {MAX_PAYLOAD_LEN} byte element limit"
        )));
    }
    Ok(())
}

/// Payload length as written in the record header.
///
/// `Buffer::try_put` refuses payloads above [`MAX_PAYLOAD_LEN`], so this
/// never saturates for a stored element.
pub(crate) fn payload_len(element: &Element) -> u32 {
    u32::try_from(element.payload.len()).unwrap_or(u32::MAX)
}

/// Bytes needed to encode one element.
pub(crate) fn encoded_len(element: &Element) -> usize {
    RECORD_HEADER_SIZE + element.payload.len()
}

/// Append one element record.
pub(crate) fn encode_record(key: ElementKey, element: &Element, out: &mut BytesMut) {
    out.put_u64(key.as_u64());
    out.put_u8(element.ty as u8);
    match element.ty.fixed_width() {
        Some(_) => out.put_u32(0),
        None => out.put_u32(payload_len(element)),
    }
    out.put_slice(&element.payload);
}

/// Parse every record in `data`.
///
/// Either the whole input parses or nothing is returned.
pub(crate) fn decode_records(mut data: Bytes) -> Result<BTreeMap<ElementKey, Element>> {
    let mut elements = BTreeMap::new();

    while data.has_remaining() {
        if data.remaining() < RECORD_HEADER_SIZE {
            return Err(WireError::MalformedBuffer(format!(
                "truncated record header: {} bytes left, need {}",
                data.remaining(),
                RECORD_HEADER_SIZE
            )));
        }

        let key = ElementKey::from_raw(data.get_u64());
        let tag = data.get_u8();
        let declared = data.get_u32() as usize;

        let ty = ElementType::from_u8(tag).ok_or_else(|| {
            WireError::MalformedBuffer(format!("unknown type tag {tag:#04x} for element {key}"))
        })?;

        let len = match ty.fixed_width() {
            Some(width) if declared == 0 => width,
            Some(_) => {
                return Err(WireError::MalformedBuffer(format!(
                    "fixed-width {ty} element {key} declares length {declared}"
                )))
            }
            None => declared,
        };

        if len > data.remaining() {
            return Err(WireError::MalformedBuffer(format!(
                "element {key} payload length {len} exceeds remaining {}",
                data.remaining()
            )));
        }

        let payload = data.split_to(len);
        validate_payload(ty, &payload)?;

        if elements
            .insert(key, Element::new(ty, payload, None))
            .is_some()
        {
            return Err(WireError::MalformedBuffer(format!(
                "duplicate element {key}"
            )));
        }
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u64, tag: u8, len: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&key.to_be_bytes());
        out.push(tag);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_payload_length_limit() {
        assert!(check_payload_len(0).is_ok());
        assert!(check_payload_len(MAX_PAYLOAD_LEN).is_ok());
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            check_payload_len(MAX_PAYLOAD_LEN + 1),
            Err(WireError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn test_record_layout() {
        let key = ElementKey::from_raw(0x0102_0304_0506_0708);
        let element = Element::new(ElementType::String, Bytes::from_static(b"hi"), None);
        let mut out = BytesMut::new();
        encode_record(key, &element, &mut out);

        assert_eq!(out.len(), encoded_len(&element));
        assert_eq!(&out[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(out[8], ElementType::String as u8);
        assert_eq!(&out[9..13], &[0, 0, 0, 2]);
        assert_eq!(&out[13..], b"hi");
    }

    #[test]
    fn test_fixed_width_writes_zero_length() {
        let element = Element::new(ElementType::U32, Bytes::from_static(&[0, 0, 0, 200]), None);
        let mut out = BytesMut::new();
        encode_record(ElementKey::from_raw(1), &element, &mut out);
        assert_eq!(&out[9..13], &[0, 0, 0, 0]);
        assert_eq!(out.len(), RECORD_HEADER_SIZE + 4);
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(decode_records(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_truncated_header() {
        let data = record(1, ElementType::U8 as u8, 0, &[5]);
        let err = decode_records(Bytes::copy_from_slice(&data[..10])).unwrap_err();
        assert!(err.to_string().contains("truncated record header"));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let data = record(1, ElementType::Bytes as u8, 10, b"short");
        let err = decode_records(Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining"));
    }

    #[test]
    fn test_decode_truncated_fixed_payload() {
        let data = record(1, ElementType::U64 as u8, 0, &[0, 0, 0]);
        assert!(decode_records(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_decode_unknown_tag() {
        let data = record(1, 0x7F, 0, &[]);
        let err = decode_records(Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("unknown type tag"));
    }

    #[test]
    fn test_decode_rejects_length_on_fixed_type() {
        let data = record(1, ElementType::U8 as u8, 1, &[5]);
        assert!(decode_records(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_decode_rejects_duplicate_keys() {
        let mut data = record(9, ElementType::U8 as u8, 0, &[1]);
        data.extend(record(9, ElementType::U8 as u8, 0, &[2]));
        let err = decode_records(Bytes::from(data)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_decode_failure_after_valid_records() {
        let mut data = record(1, ElementType::U8 as u8, 0, &[1]);
        data.extend(record(2, ElementType::String as u8, 2, &[0xC3, 0x28]));
        assert!(decode_records(Bytes::from(data)).is_err());
    }
}
