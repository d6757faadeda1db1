//! Thread-safe staging queue for assembling partial reads.
//!
//! Writers use a two-phase protocol: [`StagingQueue::reserve`] hands out a
//! writable region at the tail of the queue, the caller fills it (typically
//! straight from a socket read) and [`Reservation::commit`] publishes the
//! bytes actually written. Readers take whole byte runs from the head.
//!
//! # Example
//!
//! ```
//! use enclave_wire::channel::StagingQueue;
//!
//! let queue = StagingQueue::new();
//! let mut slot = queue.reserve(8);
//! slot.as_mut_slice()[..3].copy_from_slice(b"abc");
//! slot.commit(3);
//!
//! assert_eq!(queue.available(), 3);
//! assert!(queue.take_exact(4).is_none());
//! assert_eq!(&queue.take_exact(3).unwrap()[..], b"abc");
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};

use crate::config::DEFAULT_STAGING_CAPACITY;

/// Growable byte queue shared by one producer and one consumer.
#[derive(Debug)]
pub struct StagingQueue {
    buffer: Mutex<BytesMut>,
    readable: Condvar,
}

impl StagingQueue {
    /// Create a queue with the default initial capacity (64 KB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STAGING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(BytesMut::with_capacity(capacity)),
            readable: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a writable region of exactly `n` bytes at the tail.
    ///
    /// The queue stays locked until the reservation is committed or dropped.
    /// Dropping without committing publishes nothing.
    pub fn reserve(&self, n: usize) -> Reservation<'_> {
        let mut guard = self.lock();
        let start = guard.len();
        guard.resize(start + n, 0);
        Reservation {
            queue: self,
            guard,
            start,
            committed: 0,
        }
    }

    /// Copy `data` to the tail and wake any waiting reader.
    pub fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.lock().extend_from_slice(data);
        self.readable.notify_all();
    }

    /// Number of bytes ready to be taken.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Take exactly `n` bytes, or nothing if fewer are available.
    pub fn take_exact(&self, n: usize) -> Option<Bytes> {
        let mut guard = self.lock();
        if guard.len() < n {
            return None;
        }
        Some(guard.split_to(n).freeze())
    }

    /// Take everything currently available.
    pub fn take_all(&self) -> Bytes {
        self.lock().split().freeze()
    }

    /// Drop up to `n` bytes from the head; returns how many were dropped.
    pub fn discard(&self, n: usize) -> usize {
        let mut guard = self.lock();
        let dropped = n.min(guard.len());
        guard.advance(dropped);
        dropped
    }

    /// Block until at least `n` bytes are available or `deadline` passes.
    ///
    /// Returns whether `n` bytes are available.
    pub fn wait_for(&self, n: usize, deadline: Instant) -> bool {
        let mut guard = self.lock();
        loop {
            if guard.len() >= n {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .readable
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Discard all buffered bytes.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for StagingQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Writable region handed out by [`StagingQueue::reserve`].
pub struct Reservation<'a> {
    queue: &'a StagingQueue,
    guard: MutexGuard<'a, BytesMut>,
    start: usize,
    committed: usize,
}

impl Reservation<'_> {
    /// The reserved region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.guard[self.start..]
    }

    /// Size of the reserved region.
    pub fn len(&self) -> usize {
        self.guard.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish the first `k` bytes of the region; the rest is released.
    pub fn commit(mut self, k: usize) {
        debug_assert!(k <= self.len(), "commit beyond reservation");
        self.committed = k.min(self.len());
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let end = self.start + self.committed;
        self.guard.truncate(end);
        if self.committed > 0 {
            self.queue.readable.notify_all();
        }
    }
}
