//! # enclave-wire
//!
//! Message substrate shared by the services of a confidential-computing
//! platform: a self-describing binary container and a length-framed duplex
//! transport over plain or TLS sockets.
//!
//! ## Architecture
//!
//! - **Buffer**: typed, named, nestable elements with cached content and
//!   composition hashes
//! - **Channels**: blocking sockets whose reads return exactly the requested
//!   bytes or time out, optionally wrapped in a hand-pumped TLS session
//! - **Transactions**: `[u32 BE length][serialized Buffer]` frames
//!
//! Everything blocks the calling thread; run one thread per connection.
//!
//! ## Example
//!
//! ```
//! use std::os::unix::net::UnixStream;
//! use std::time::Duration;
//!
//! use enclave_wire::{transaction, Buffer, ByteChannel};
//!
//! let (a, b) = UnixStream::pair()?;
//! let (mut left, mut right) = (ByteChannel::new(a), ByteChannel::new(b));
//!
//! let mut request = Buffer::new();
//! request.put("Status", true);
//! request.put("Code", 200i32);
//! transaction::put_transaction(&mut left, &request)?;
//!
//! let received = transaction::get_transaction(&mut right, Duration::from_secs(1))?
//!     .expect("frame sent above");
//! assert_eq!(received.get::<i32>("code")?, 200);
//! assert_eq!(received.content_hash(), request.content_hash());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod tls;
pub mod transaction;
pub mod transport;

pub use buffer::{Buffer, ElementKey, ElementType};
pub use channel::{ByteChannel, Channel};
pub use config::{ChannelConfig, TransactionConfig};
pub use error::{Result, WireError};
pub use tls::{SecureChannel, TlsConfig, TlsState};
pub use transaction::{get_transaction, put_transaction, put_transaction_and_get_response};
