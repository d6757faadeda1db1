//! Transport module - endpoints that produce connected channels.
//!
//! - Unix-domain sockets for trusted local IPC
//! - TCP for network links, usually wrapped in a
//!   [`SecureChannel`](crate::tls::SecureChannel)
//!
//! Endpoints are plain values passed to the components that need them.

mod ipc;
mod tcp;

pub use ipc::{connect_ipc, connect_ipc_with_config, generate_socket_path, IpcListener};
pub use tcp::{connect_tcp, connect_tcp_with_config, TcpEndpoint};
