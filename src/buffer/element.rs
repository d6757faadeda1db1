//! Element keys, type tags and stored elements.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use xxhash_rust::xxh3::Xxh3;

/// 64-bit identity of an element name.
///
/// Names are case-insensitive: the key is the xxh3-64 hash of the
/// lowercased name (Unicode `to_lowercase`, so `"Größe"` and `"GRÖSSE"` still
/// differ but `"Größe"` and `"grÖße"` match). Only the key travels on the wire, so two names that
/// collide under the hash address the same element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementKey(u64);

impl ElementKey {
    /// Compute the key for a name.
    pub fn from_name(name: &str) -> Self {
        if !name.is_ascii() {
            return Self(xxhash_rust::xxh3::xxh3_64(name.to_lowercase().as_bytes()));
        }
        let mut hasher = Xxh3::new();
        let mut chunk = [0u8; 64];
        for part in name.as_bytes().chunks(chunk.len()) {
            let lowered = &mut chunk[..part.len()];
            lowered.copy_from_slice(part);
            lowered.make_ascii_lowercase();
            hasher.update(lowered);
        }
        Self(hasher.digest())
    }

    /// Wrap a raw key read from the wire.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw 64-bit value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<&str> for ElementKey {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Type tag of an element.
///
/// The discriminant is the byte written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Null = 0x00,
    Bool = 0x01,
    Char = 0x02,
    String = 0x03,
    I8 = 0x04,
    I16 = 0x05,
    I32 = 0x06,
    I64 = 0x07,
    U8 = 0x08,
    U16 = 0x09,
    U32 = 0x0A,
    U64 = 0x0B,
    F32 = 0x0C,
    F64 = 0x0D,
    Bytes = 0x0E,
    Buffer = 0x0F,
    Guid = 0x10,
}

impl ElementType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Null),
            0x01 => Some(Self::Bool),
            0x02 => Some(Self::Char),
            0x03 => Some(Self::String),
            0x04 => Some(Self::I8),
            0x05 => Some(Self::I16),
            0x06 => Some(Self::I32),
            0x07 => Some(Self::I64),
            0x08 => Some(Self::U8),
            0x09 => Some(Self::U16),
            0x0A => Some(Self::U32),
            0x0B => Some(Self::U64),
            0x0C => Some(Self::F32),
            0x0D => Some(Self::F64),
            0x0E => Some(Self::Bytes),
            0x0F => Some(Self::Buffer),
            0x10 => Some(Self::Guid),
            _ => None,
        }
    }

    /// Payload width implied by the tag.
    ///
    /// `None` means the width is carried explicitly in the record.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Bool | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::Char | Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::String | Self::Bytes | Self::Buffer | Self::Guid => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::String => "string",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bytes => "bytes",
            Self::Buffer => "buffer",
            Self::Guid => "guid",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element names of a locally built nested buffer, by key.
///
/// Lets a nested buffer read back with `get` or rendered with `to_json`
/// keep the names it was built with. Never serialized.
#[derive(Debug, Default)]
pub struct NameTable {
    entries: BTreeMap<ElementKey, NamedEntry>,
}

#[derive(Debug)]
pub(crate) struct NamedEntry {
    pub(crate) name: Box<str>,
    pub(crate) nested: Option<Arc<NameTable>>,
}

impl NameTable {
    pub(crate) fn insert(&mut self, key: ElementKey, name: Box<str>, nested: Option<Arc<NameTable>>) {
        self.entries.insert(key, NamedEntry { name, nested });
    }

    pub(crate) fn get(&self, key: &ElementKey) -> Option<&NamedEntry> {
        self.entries.get(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One stored element: its type tag and raw payload.
#[derive(Clone)]
pub struct Element {
    pub(crate) ty: ElementType,
    pub(crate) payload: Bytes,
    /// Name as given to `put`; unknown for decoded elements.
    pub(crate) name: Option<Box<str>>,
    /// Names inside a nested buffer element built locally.
    pub(crate) nested: Option<Arc<NameTable>>,
}

impl Element {
    pub(crate) fn new(ty: ElementType, payload: Bytes, name: Option<Box<str>>) -> Self {
        Self {
            ty,
            payload,
            name,
            nested: None,
        }
    }

    pub(crate) fn with_nested_names(mut self, nested: Option<Arc<NameTable>>) -> Self {
        self.nested = nested;
        self
    }

    pub(crate) fn nested_names(&self) -> Option<&NameTable> {
        self.nested.as_deref()
    }

    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    /// Raw payload bytes as they appear on the wire (big-endian scalars).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// The original name is local bookkeeping and never part of equality.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.payload == other.payload
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("type", &self.ty)
            .field("name", &self.name)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_case_insensitive() {
        assert_eq!(ElementKey::from_name("Status"), ElementKey::from_name("STATUS"));
        assert_eq!(ElementKey::from_name("Status"), ElementKey::from_name("status"));
        assert_ne!(ElementKey::from_name("Status"), ElementKey::from_name("Code"));
    }

    #[test]
    fn test_key_folds_non_ascii_case() {
        assert_eq!(ElementKey::from_name("Größe"), ElementKey::from_name("grÖße"));
        assert_eq!(ElementKey::from_name("ÉTAT"), ElementKey::from_name("état"));
        assert_ne!(ElementKey::from_name("Größe"), ElementKey::from_name("Grosse"));
    }

    #[test]
    fn test_key_long_names_hash_consistently() {
        let long = "Element".repeat(40);
        assert_eq!(
            ElementKey::from_name(&long),
            ElementKey::from_name(&long.to_uppercase())
        );
        assert_ne!(
            ElementKey::from_name(&long),
            ElementKey::from_name(&format!("{long}x"))
        );
    }

    #[test]
    fn test_key_matches_lowercased_digest() {
        let expected = xxhash_rust::xxh3::xxh3_64(b"jobidentifier");
        assert_eq!(ElementKey::from_name("JobIdentifier").as_u64(), expected);
    }

    #[test]
    fn test_type_tag_roundtrip() {
        for b in 0x00..=0x10u8 {
            let ty = ElementType::from_u8(b).unwrap();
            assert_eq!(ty as u8, b);
        }
        assert!(ElementType::from_u8(0x11).is_none());
        assert!(ElementType::from_u8(0xFF).is_none());
    }

    #[test]
    fn test_fixed_widths() {
        assert_eq!(ElementType::Null.fixed_width(), Some(0));
        assert_eq!(ElementType::Bool.fixed_width(), Some(1));
        assert_eq!(ElementType::U16.fixed_width(), Some(2));
        assert_eq!(ElementType::Char.fixed_width(), Some(4));
        assert_eq!(ElementType::F64.fixed_width(), Some(8));
        assert_eq!(ElementType::String.fixed_width(), None);
        assert_eq!(ElementType::Guid.fixed_width(), None);
    }

    #[test]
    fn test_element_equality_ignores_name() {
        let a = Element::new(ElementType::U8, Bytes::from_static(&[7]), Some("a".into()));
        let b = Element::new(ElementType::U8, Bytes::from_static(&[7]), None);
        assert_eq!(a, b);
    }
}
