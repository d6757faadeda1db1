//! Structured buffer: typed, named, nested elements with a binary encoding.
//!
//! A [`Buffer`] maps 64-bit name hashes ([`ElementKey`]) to typed elements.
//! It serializes to a flat sequence of element records (see [`wire`]) and
//! keeps three lazily computed caches: the content hash, the composition hash
//! and the serialized bytes. Every mutation resets all three.
//!
//! # Example
//!
//! ```
//! use enclave_wire::buffer::{Buffer, ElementType};
//!
//! let mut request = Buffer::new();
//! request.put("Status", true);
//! request.put("Code", 200u32);
//!
//! let decoded = Buffer::deserialize(&request.serialize()).unwrap();
//! assert!(decoded.get::<bool>("Status").unwrap());
//! assert_eq!(decoded.get::<u32>("Code").unwrap(), 200);
//! assert!(decoded.get::<String>("Status").is_err());
//! assert!(decoded.is_present("code", ElementType::U32));
//! ```
//!
//! Buffers are not internally synchronized. The caches live in `Cell`s, so a
//! `Buffer` is `Send` but not `Sync`; share one across threads behind a lock.

mod element;
mod value;
pub mod wire;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::codec::MsgPackCodec;
use crate::error::{Result, WireError};

use element::NameTable;

pub use element::{Element, ElementKey, ElementType};
pub use value::{FromElement, IntoElement};

/// Lazily computed value that is reset by mutation.
///
/// Zero is a legal hash, so "not computed" needs its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cached<T> {
    #[default]
    Unknown,
    Value(T),
}

impl<T> Cached<T> {
    #[inline]
    pub fn is_known(&self) -> bool {
        matches!(self, Cached::Value(_))
    }
}

/// Typed, named key-value container with binary encode/decode.
#[derive(Clone, Default)]
pub struct Buffer {
    elements: BTreeMap<ElementKey, Element>,
    content_hash: Cell<Cached<u64>>,
    composition_hash: Cell<Cached<u64>>,
    serialized: RefCell<Cached<Bytes>>,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a buffer from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedBuffer`] if any record is truncated,
    /// carries an unknown type tag or an invalid payload. Nested buffers are
    /// checked when they are read with `get::<Buffer>`.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }

    /// Decode a buffer, sharing `data`'s storage for element payloads.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let elements = wire::decode_records(data)?;
        Ok(Self {
            elements,
            ..Self::default()
        })
    }

    /// Serialized form: the concatenation of all element records in key order.
    ///
    /// The result is cached until the next mutation.
    pub fn serialize(&self) -> Bytes {
        if let Cached::Value(bytes) = &*self.serialized.borrow() {
            return bytes.clone();
        }

        let size = self.elements.values().map(wire::encoded_len).sum();
        let mut out = BytesMut::with_capacity(size);
        for (key, element) in &self.elements {
            wire::encode_record(*key, element, &mut out);
        }
        let bytes = out.freeze();

        *self.serialized.borrow_mut() = Cached::Value(bytes.clone());
        bytes
    }

    /// Length of the serialized form in bytes.
    pub fn serialized_len(&self) -> usize {
        self.elements.values().map(wire::encoded_len).sum()
    }

    /// Store `value` under `name`, replacing any existing element.
    ///
    /// # Panics
    ///
    /// If the encoded payload is larger than [`wire::MAX_PAYLOAD_LEN`]
    /// (4 GiB). Use [`Buffer::try_put`] for sizes that are not known to fit.
    pub fn put<V: IntoElement>(&mut self, name: &str, value: V) {
        if let Err(e) = self.try_put(name, value) {
            panic!("Buffer::put({name:?}): {e}");
        }
    }

    /// Store `value` under `name`, rejecting payloads the record length
    /// field cannot describe.
    ///
    /// # Errors
    ///
    /// [`WireError::MalformedBuffer`] if the payload exceeds
    /// [`wire::MAX_PAYLOAD_LEN`]; the buffer is left unchanged.
    pub fn try_put<V: IntoElement>(&mut self, name: &str, value: V) -> Result<()> {
        let mut payload = BytesMut::new();
        value.encode_payload(&mut payload);
        wire::check_payload_len(payload.len())?;
        let element = Element::new(V::TYPE, payload.freeze(), Some(name.into()))
            .with_nested_names(value.nested_names());
        self.elements.insert(ElementKey::from_name(name), element);
        self.invalidate();
        Ok(())
    }

    /// Read the element stored under `name` as `T`.
    ///
    /// # Errors
    ///
    /// [`WireError::NotFound`] if no element has this name,
    /// [`WireError::TypeMismatch`] if it was stored as another type.
    pub fn get<T: FromElement>(&self, name: &str) -> Result<T> {
        let key = ElementKey::from_name(name);
        let element = self.element_by_key(key)?;
        if element.ty != T::TYPE {
            return Err(WireError::TypeMismatch {
                key,
                expected: T::TYPE,
                found: element.ty,
            });
        }
        T::decode_payload(&element.payload)
            .map(|value| value.restore_names(element.nested_names()))
    }

    /// Borrow a string element without copying.
    pub fn get_str(&self, name: &str) -> Result<&str> {
        let key = ElementKey::from_name(name);
        let element = self.typed_element(key, ElementType::String)?;
        std::str::from_utf8(&element.payload)
            .map_err(|e| WireError::MalformedBuffer(format!("invalid UTF-8 in string: {e}")))
    }

    /// Borrow a bytes element without copying.
    pub fn get_slice(&self, name: &str) -> Result<&[u8]> {
        let key = ElementKey::from_name(name);
        Ok(&self.typed_element(key, ElementType::Bytes)?.payload)
    }

    /// Store a serde value as a MessagePack-encoded bytes element.
    pub fn put_serde<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let encoded = MsgPackCodec::encode(value)?;
        self.try_put(name, encoded)
    }

    /// Read a bytes element written by [`Buffer::put_serde`].
    pub fn get_serde<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        MsgPackCodec::decode(self.get_slice(name)?)
    }

    /// Whether an element named `name` exists with type `ty`.
    pub fn is_present(&self, name: &str, ty: ElementType) -> bool {
        self.element_type(name) == Some(ty)
    }

    /// Type of the element named `name`, if any.
    pub fn element_type(&self, name: &str) -> Option<ElementType> {
        self.elements
            .get(&ElementKey::from_name(name))
            .map(Element::element_type)
    }

    /// Look up an element by key.
    pub fn element(&self, key: ElementKey) -> Option<&Element> {
        self.elements.get(&key)
    }

    /// Remove the element named `name`. Returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self
            .elements
            .remove(&ElementKey::from_name(name))
            .is_some();
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.invalidate();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Keys of all elements, with the original name where it is known.
    ///
    /// Names only survive for elements inserted locally; decoded elements
    /// report `None` because the wire carries hashes only.
    pub fn names_of_elements(&self) -> impl Iterator<Item = (ElementKey, Option<&str>)> + '_ {
        self.elements
            .iter()
            .map(|(key, element)| (*key, element.name()))
    }

    /// Iterate over all elements in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementKey, &Element)> + '_ {
        self.elements.iter().map(|(key, element)| (*key, element))
    }

    /// Hash over every element's key, type and payload.
    pub fn content_hash(&self) -> u64 {
        if let Cached::Value(hash) = self.content_hash.get() {
            return hash;
        }
        let mut hasher = Xxh3::new();
        for (key, element) in &self.elements {
            hasher.update(&key.as_u64().to_be_bytes());
            hasher.update(&[element.ty as u8]);
            hasher.update(&wire::payload_len(element).to_be_bytes());
            hasher.update(&element.payload);
        }
        let hash = hasher.digest();
        self.content_hash.set(Cached::Value(hash));
        hash
    }

    /// Hash over every element's key and type, ignoring values.
    pub fn composition_hash(&self) -> u64 {
        if let Cached::Value(hash) = self.composition_hash.get() {
            return hash;
        }
        let mut hasher = Xxh3::new();
        for (key, element) in &self.elements {
            hasher.update(&key.as_u64().to_be_bytes());
            hasher.update(&[element.ty as u8]);
        }
        let hash = hasher.digest();
        self.composition_hash.set(Cached::Value(hash));
        hash
    }

    /// Diagnostic JSON rendering.
    ///
    /// Keys are original names where known, otherwise the hex key. Bytes
    /// render as hex strings, nested buffers recursively.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, element) in &self.elements {
            let label = match element.name() {
                Some(name) => name.to_string(),
                None => key.to_string(),
            };
            map.insert(label, element_json(element));
        }
        Value::Object(map)
    }

    /// Names of locally inserted elements, carried alongside a nested payload.
    fn name_table(&self) -> Option<Arc<NameTable>> {
        let mut table = NameTable::default();
        for (key, element) in &self.elements {
            if let Some(name) = &element.name {
                table.insert(*key, name.clone(), element.nested.clone());
            }
        }
        (!table.is_empty()).then(|| Arc::new(table))
    }

    fn apply_names(&mut self, names: &NameTable) {
        for (key, element) in &mut self.elements {
            if let Some(entry) = names.get(key) {
                element.name = Some(entry.name.clone());
                element.nested = entry.nested.clone();
            }
        }
    }

    fn element_by_key(&self, key: ElementKey) -> Result<&Element> {
        self.elements
            .get(&key)
            .ok_or(WireError::NotFound { key })
    }

    fn typed_element(&self, key: ElementKey, ty: ElementType) -> Result<&Element> {
        let element = self.element_by_key(key)?;
        if element.ty != ty {
            return Err(WireError::TypeMismatch {
                key,
                expected: ty,
                found: element.ty,
            });
        }
        Ok(element)
    }

    fn invalidate(&mut self) {
        self.content_hash.set(Cached::Unknown);
        self.composition_hash.set(Cached::Unknown);
        *self.serialized.get_mut() = Cached::Unknown;
    }

    #[cfg(test)]
    fn caches_known(&self) -> (bool, bool, bool) {
        (
            self.content_hash.get().is_known(),
            self.composition_hash.get().is_known(),
            self.serialized.borrow().is_known(),
        )
    }
}

fn element_json(element: &Element) -> Value {
    let payload = &element.payload;
    let rendered = match element.ty {
        ElementType::Null => Ok(Value::Null),
        ElementType::Bool => bool::decode_payload(payload).map(Value::from),
        ElementType::Char => char::decode_payload(payload).map(|c| Value::from(c.to_string())),
        ElementType::String => String::decode_payload(payload).map(Value::from),
        ElementType::I8 => i8::decode_payload(payload).map(Value::from),
        ElementType::I16 => i16::decode_payload(payload).map(Value::from),
        ElementType::I32 => i32::decode_payload(payload).map(Value::from),
        ElementType::I64 => i64::decode_payload(payload).map(Value::from),
        ElementType::U8 => u8::decode_payload(payload).map(Value::from),
        ElementType::U16 => u16::decode_payload(payload).map(Value::from),
        ElementType::U32 => u32::decode_payload(payload).map(Value::from),
        ElementType::U64 => u64::decode_payload(payload).map(Value::from),
        ElementType::F32 => f32::decode_payload(payload).map(|f| Value::from(f64::from(f))),
        ElementType::F64 => f64::decode_payload(payload).map(Value::from),
        ElementType::Bytes => Ok(Value::from(
            payload.iter().map(|b| format!("{b:02x}")).collect::<String>(),
        )),
        ElementType::Buffer => Buffer::decode_payload(payload)
            .map(|nested| nested.restore_names(element.nested_names()).to_json()),
        ElementType::Guid => Uuid::decode_payload(payload).map(|id| Value::from(id.to_string())),
    };
    rendered.unwrap_or_else(|e| Value::from(format!("<{e}>")))
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.elements.iter().map(|(key, element)| {
                let label = element.name().map_or_else(|| key.to_string(), str::to_string);
                (label, element)
            }))
            .finish()
    }
}
