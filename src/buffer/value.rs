//! Conversions between Rust values and element payloads.
//!
//! [`IntoElement`] is implemented for everything `Buffer::put` accepts and
//! [`FromElement`] for everything `Buffer::get` can return. Scalars are
//! written big-endian; floats keep their exact IEEE-754 bits.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::element::NameTable;
use super::{Buffer, ElementType};
use crate::error::{Result, WireError};

/// A value that can be stored as an element.
pub trait IntoElement {
    /// Tag the element is stored under.
    const TYPE: ElementType;

    /// Append the payload bytes.
    fn encode_payload(&self, out: &mut BytesMut);

    #[doc(hidden)]
    fn nested_names(&self) -> Option<Arc<NameTable>> {
        None
    }
}

/// A value that can be read back from an element.
pub trait FromElement: Sized {
    /// Tag the element must carry.
    const TYPE: ElementType;

    /// Decode from the payload of an element whose tag is `TYPE`.
    fn decode_payload(payload: &Bytes) -> Result<Self>;

    #[doc(hidden)]
    fn restore_names(self, _names: Option<&NameTable>) -> Self {
        self
    }
}

fn fixed<const N: usize>(payload: &[u8], ty: ElementType) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        WireError::MalformedBuffer(format!(
            "{} payload is {} bytes, expected {}",
            ty,
            payload.len(),
            N
        ))
    })
}

macro_rules! scalar_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl IntoElement for $ty {
                const TYPE: ElementType = ElementType::$tag;

                #[inline]
                fn encode_payload(&self, out: &mut BytesMut) {
                    out.put_slice(&self.to_be_bytes());
                }
            }

            impl FromElement for $ty {
                const TYPE: ElementType = ElementType::$tag;

                #[inline]
                fn decode_payload(payload: &Bytes) -> Result<Self> {
                    Ok(<$ty>::from_be_bytes(fixed(payload, ElementType::$tag)?))
                }
            }
        )*
    };
}

scalar_element! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl IntoElement for () {
    const TYPE: ElementType = ElementType::Null;

    fn encode_payload(&self, _out: &mut BytesMut) {}
}

impl FromElement for () {
    const TYPE: ElementType = ElementType::Null;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        fixed::<0>(payload, ElementType::Null).map(|_| ())
    }
}

impl IntoElement for bool {
    const TYPE: ElementType = ElementType::Bool;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_u8(u8::from(*self));
    }
}

impl FromElement for bool {
    const TYPE: ElementType = ElementType::Bool;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        match fixed::<1>(payload, ElementType::Bool)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(WireError::MalformedBuffer(format!(
                "invalid bool byte {other:#04x}"
            ))),
        }
    }
}

impl IntoElement for char {
    const TYPE: ElementType = ElementType::Char;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_u32(u32::from(*self));
    }
}

impl FromElement for char {
    const TYPE: ElementType = ElementType::Char;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        let raw = u32::from_be_bytes(fixed(payload, ElementType::Char)?);
        char::from_u32(raw)
            .ok_or_else(|| WireError::MalformedBuffer(format!("invalid char {raw:#x}")))
    }
}

impl IntoElement for &str {
    const TYPE: ElementType = ElementType::String;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self.as_bytes());
    }
}

impl IntoElement for String {
    const TYPE: ElementType = ElementType::String;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self.as_bytes());
    }
}

impl IntoElement for &String {
    const TYPE: ElementType = ElementType::String;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self.as_bytes());
    }
}

impl FromElement for String {
    const TYPE: ElementType = ElementType::String;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        String::from_utf8(payload.to_vec())
            .map_err(|e| WireError::MalformedBuffer(format!("invalid UTF-8 in string: {e}")))
    }
}

impl IntoElement for &[u8] {
    const TYPE: ElementType = ElementType::Bytes;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self);
    }
}

impl IntoElement for Vec<u8> {
    const TYPE: ElementType = ElementType::Bytes;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self);
    }
}

impl IntoElement for Bytes {
    const TYPE: ElementType = ElementType::Bytes;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self);
    }
}

impl FromElement for Vec<u8> {
    const TYPE: ElementType = ElementType::Bytes;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        Ok(payload.to_vec())
    }
}

impl FromElement for Bytes {
    const TYPE: ElementType = ElementType::Bytes;

    /// Zero-copy: shares the buffer's storage.
    fn decode_payload(payload: &Bytes) -> Result<Self> {
        Ok(payload.clone())
    }
}

impl IntoElement for Uuid {
    const TYPE: ElementType = ElementType::Guid;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(self.as_bytes());
    }
}

impl FromElement for Uuid {
    const TYPE: ElementType = ElementType::Guid;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        Ok(Uuid::from_bytes(fixed(payload, ElementType::Guid)?))
    }
}

impl IntoElement for &Buffer {
    const TYPE: ElementType = ElementType::Buffer;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(&self.serialize());
    }

    fn nested_names(&self) -> Option<Arc<NameTable>> {
        self.name_table()
    }
}

impl IntoElement for Buffer {
    const TYPE: ElementType = ElementType::Buffer;

    fn encode_payload(&self, out: &mut BytesMut) {
        out.put_slice(&self.serialize());
    }

    fn nested_names(&self) -> Option<Arc<NameTable>> {
        self.name_table()
    }
}

impl FromElement for Buffer {
    const TYPE: ElementType = ElementType::Buffer;

    fn decode_payload(payload: &Bytes) -> Result<Self> {
        Buffer::from_bytes(payload.clone())
    }

    fn restore_names(mut self, names: Option<&NameTable>) -> Self {
        if let Some(names) = names {
            self.apply_names(names);
        }
        self
    }
}

/// Check a payload read from the wire against its tag.
///
/// Only explicit-width types need checking here; fixed widths are enforced
/// by the record parser. Nested buffers are validated when they are read.
pub(crate) fn validate_payload(ty: ElementType, payload: &Bytes) -> Result<()> {
    match ty {
        ElementType::String => std::str::from_utf8(payload)
            .map(|_| ())
            .map_err(|e| WireError::MalformedBuffer(format!("invalid UTF-8 in string: {e}"))),
        ElementType::Char => char::decode_payload(payload).map(|_| ()),
        ElementType::Bool => bool::decode_payload(payload).map(|_| ()),
        ElementType::Guid => Uuid::decode_payload(payload).map(|_| ()),
        _ => Ok(()),
    }
}
