//! Database statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let db = Database::open_in_memory()?;
//! db.save(&mut player)?;
//!
//! let stats = db.stats();
//! println!("saves: {}", stats.saves);
//! println!("deadlocks: {}", stats.deadlocks);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics and metrics.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    saves: AtomicU64,
    inserts: AtomicU64,
    deletes: AtomicU64,
    refreshes: AtomicU64,
    queries: AtomicU64,

    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    deadlocks: AtomicU64,
    write_conflicts: AtomicU64,
    retries: AtomicU64,

    bytes_written: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a save; `inserted` is true for a first save.
    pub(crate) fn record_save(&self, inserted: bool) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        if inserted {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            saves: load(&self.saves),
            inserts: load(&self.inserts),
            deletes: load(&self.deletes),
            refreshes: load(&self.refreshes),
            queries: load(&self.queries),
            transactions_started: load(&self.transactions_started),
            transactions_committed: load(&self.transactions_committed),
            transactions_aborted: load(&self.transactions_aborted),
            deadlocks: load(&self.deadlocks),
            write_conflicts: load(&self.write_conflicts),
            retries: load(&self.retries),
            bytes_written: load(&self.bytes_written),
        }
    }
}

/// A point-in-time snapshot of database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful `save()` calls, first saves included.
    pub saves: u64,
    /// First saves that assigned identity.
    pub inserts: u64,
    /// `delete()` calls that removed a stored document.
    pub deletes: u64,
    /// Successful `refresh()` calls.
    pub refreshes: u64,
    /// Executed queries.
    pub queries: u64,
    /// Transactions started, retries included.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_aborted: u64,
    /// Lock requests aborted as deadlock victims.
    pub deadlocks: u64,
    /// Commits rejected by the revision check.
    pub write_conflicts: u64,
    /// Re-invocations of transactional work.
    pub retries: u64,
    /// Journal bytes appended.
    pub bytes_written: u64,
}
