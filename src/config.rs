//! Channel and framing configuration.
//!
//! Both structs derive `serde` so owning services can embed them in their own
//! configuration files; missing fields fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default size of a single socket read into the staging queue (16 KB).
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// Default initial staging queue capacity (64 KB).
pub const DEFAULT_STAGING_CAPACITY: usize = 64 * 1024;

/// Default deadline for a whole TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ceiling on a frame's declared payload length (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Socket-level channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Bytes requested from the kernel per read.
    pub read_chunk_size: usize,
    /// Initial capacity of the staging queue.
    pub staging_capacity: usize,
    /// Deadline for the TLS handshake, in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub fn staging_capacity(mut self, capacity: usize) -> Self {
        self.staging_capacity = capacity;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn handshake_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Transaction framing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Largest payload length accepted from a peer.
    pub max_frame_size: u32,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
