//! A backend wrapper that simulates an unreachable store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Remote control for a [`FaultyBackend`].
///
/// Clones control the same backend, so a test keeps one clone after handing
/// the backend to a database.
#[derive(Debug, Clone)]
pub struct OutageSwitch {
    offline: Arc<AtomicBool>,
    /// Number of bytes the next append writes before failing. `u64::MAX` means disarmed.
    torn_append: Arc<AtomicU64>,
}

impl OutageSwitch {
    /// Creates a switch in the online position.
    #[must_use]
    pub fn new() -> Self {
        Self {
            offline: Arc::new(AtomicBool::new(false)),
            torn_append: Arc::new(AtomicU64::new(u64::MAX)),
        }
    }

    /// Makes every backend operation fail with [`StorageError::Unavailable`].
    pub fn take_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Restores normal operation.
    pub fn bring_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend is currently offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Makes the next append write only `bytes` bytes and then fail.
    pub fn tear_next_append(&self, bytes: u64) {
        self.torn_append.store(bytes, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.is_offline() {
            Err(StorageError::unavailable("backend switched offline"))
        } else {
            Ok(())
        }
    }
}

impl Default for OutageSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a backend and fails on demand.
///
/// # Example
///
/// ```rust
/// use facetdb_storage::{FaultyBackend, InMemoryBackend, StorageBackend};
///
/// let mut backend = FaultyBackend::new(InMemoryBackend::new());
/// let switch = backend.switch();
/// switch.take_offline();
/// assert!(backend.append(b"x").is_err());
/// switch.bring_online();
/// assert!(backend.append(b"x").is_ok());
/// ```
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    switch: OutageSwitch,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner` with a fresh, online switch.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            switch: OutageSwitch::new(),
        }
    }

    /// Returns a handle controlling this backend.
    #[must_use]
    pub fn switch(&self) -> OutageSwitch {
        self.switch.clone()
    }
}

impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.switch.check()?;
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.switch.check()?;
        let torn = self.switch.torn_append.swap(u64::MAX, Ordering::SeqCst);
        if torn != u64::MAX {
            let keep = usize::try_from(torn).unwrap_or(usize::MAX).min(data.len());
            self.inner.append(&data[..keep])?;
            return Err(StorageError::unavailable("append torn mid-write"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.switch.check()?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.switch.check()?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.switch.check()?;
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.switch.check()?;
        self.inner.truncate(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;

    #[test]
    fn offline_fails_every_operation() {
        let mut backend = FaultyBackend::new(InMemoryBackend::new());
        backend.append(b"data").unwrap();
        let switch = backend.switch();
        switch.take_offline();

        assert!(matches!(backend.size(), Err(StorageError::Unavailable { .. })));
        assert!(backend.read_at(0, 4).is_err());
        assert!(backend.append(b"more").is_err());
        assert!(backend.flush().is_err());
        assert!(backend.truncate(0).is_err());
    }

    #[test]
    fn online_again_after_outage() {
        let mut backend = FaultyBackend::new(InMemoryBackend::new());
        let switch = backend.switch();
        switch.take_offline();
        switch.bring_online();
        assert_eq!(backend.append(b"ok").unwrap(), 0);
    }

    #[test]
    fn torn_append_writes_prefix_once() {
        let memory = InMemoryBackend::new();
        let mut backend = FaultyBackend::new(memory.clone());
        backend.switch().tear_next_append(2);

        assert!(backend.append(b"abcdef").is_err());
        assert_eq!(memory.snapshot(), b"ab");

        backend.append(b"gh").unwrap();
        assert_eq!(memory.snapshot(), b"abgh");
    }
}
