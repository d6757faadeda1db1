//! Unix-domain socket endpoints.
//!
//! # Example
//!
//! ```no_run
//! use enclave_wire::transport::{generate_socket_path, IpcListener};
//!
//! let path = generate_socket_path("scheduler");
//! let listener = IpcListener::bind(&path)?;
//! let channel = listener.accept()?;
//! # Ok::<(), enclave_wire::WireError>(())
//! ```

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::channel::ByteChannel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Unique socket path under the system temp directory.
///
/// Format: `{tmp}/enclave-wire-{role}-{pid}-{uuid}.sock`.
pub fn generate_socket_path(role: &str) -> PathBuf {
    let name = format!(
        "enclave-wire-{}-{}-{}.sock",
        role,
        std::process::id(),
        Uuid::new_v4().simple()
    );
    std::env::temp_dir().join(name)
}

/// Listening Unix-domain socket that removes its path when dropped.
#[derive(Debug)]
pub struct IpcListener {
    listener: UnixListener,
    path: PathBuf,
    config: ChannelConfig,
}

impl IpcListener {
    /// Bind to `path`, replacing a stale socket file left by an earlier run.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, ChannelConfig::default())
    }

    pub fn bind_with_config(path: impl AsRef<Path>, config: ChannelConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            tracing::debug!("removing stale socket {}", path.display());
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        tracing::debug!("listening on {}", path.display());
        Ok(Self {
            listener,
            path,
            config,
        })
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> Result<ByteChannel<UnixStream>> {
        let (stream, _addr) = self.listener.accept()?;
        tracing::trace!("accepted connection on {}", self.path.display());
        Ok(ByteChannel::with_config(stream, &self.config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Connect to a listening Unix-domain socket.
pub fn connect_ipc(path: impl AsRef<Path>) -> Result<ByteChannel<UnixStream>> {
    connect_ipc_with_config(path, &ChannelConfig::default())
}

pub fn connect_ipc_with_config(
    path: impl AsRef<Path>,
    config: &ChannelConfig,
) -> Result<ByteChannel<UnixStream>> {
    let stream = UnixStream::connect(path)?;
    Ok(ByteChannel::with_config(stream, config))
}
