//! Codec module - serde values carried inside buffer elements.
//!
//! Buffers have a closed set of element types. Collaborators that already
//! model their messages as `serde` types store them as MessagePack inside a
//! bytes element via [`Buffer::put_serde`](crate::buffer::Buffer::put_serde).
//!
//! # Example
//!
//! ```
//! use enclave_wire::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
