//! Error types for enclave-wire.

use thiserror::Error;

use crate::buffer::{ElementKey, ElementType};

/// Main error type for all enclave-wire operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No element is stored under the requested name.
    #[error("Element {key} not found")]
    NotFound { key: ElementKey },

    /// An element exists but was stored with a different type.
    #[error("Element {key} has type {found}, expected {expected}")]
    TypeMismatch {
        key: ElementKey,
        expected: ElementType,
        found: ElementType,
    },

    /// Serialized buffer bytes are truncated or inconsistent.
    #[error("Malformed buffer: {0}")]
    MalformedBuffer(String),

    /// Frame length prefix is out of range or the payload never arrived.
    ///
    /// The declared payload is skipped, so the channel stays usable.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A request/response call got no reply in time.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Peer closed the connection, or the channel was closed by an earlier fault.
    #[error("Connection closed")]
    ConnectionClosed,

    /// TLS handshake failed; the channel cannot be used.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// TLS protocol error after the handshake.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// TLS certificates, keys or settings are unusable.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl WireError {
    /// Whether the channel that produced this error must be discarded.
    ///
    /// Decode, framing and lookup failures concern a single message; the
    /// stream is realigned on the next frame boundary and can be reused.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireError::Io(_)
                | WireError::ConnectionClosed
                | WireError::Handshake(_)
                | WireError::Tls(_)
        )
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;
