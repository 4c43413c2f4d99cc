//! Document and predicate locks with deadlock detection.
//!
//! Locks belong to transactions and are held until the transaction ends.
//! A blocked request records what it waits for; before every wait the
//! wait-for graph is searched, and a request that would close a cycle fails
//! with [`CoreError::DeadlockDetected`] instead of waiting.

use crate::error::{CoreError, CoreResult};
use crate::types::{DocumentKey, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

/// Lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// A single holder; excludes every other lock.
    Exclusive,
}

impl LockMode {
    fn compatible_with(self, held: Self) -> bool {
        self == Self::Shared && held == Self::Shared
    }
}

/// What a lock protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// One stored document.
    Document(DocumentKey),
    /// The result set of a filter over a collection.
    Predicate {
        /// Collection the filter runs over.
        collection: String,
        /// Canonical serialized form of the filter.
        fingerprint: String,
    },
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(key) => write!(f, "document {key}"),
            Self::Predicate {
                collection,
                fingerprint,
            } => write!(f, "predicate {collection}[{fingerprint}]"),
        }
    }
}

#[derive(Default)]
struct LockTable {
    holders: HashMap<LockTarget, HashMap<TransactionId, LockMode>>,
    held: HashMap<TransactionId, HashSet<LockTarget>>,
    waiting: HashMap<TransactionId, (LockTarget, LockMode)>,
}

impl LockTable {
    /// Transactions that prevent `txid` from taking `target` in `mode`.
    fn blockers(&self, txid: TransactionId, target: &LockTarget, mode: LockMode) -> Vec<TransactionId> {
        let Some(holders) = self.holders.get(target) else {
            return Vec::new();
        };
        if holders.get(&txid) == Some(&LockMode::Exclusive) {
            return Vec::new();
        }
        holders
            .iter()
            .filter(|(holder, held)| **holder != txid && !mode.compatible_with(**held))
            .map(|(holder, _)| *holder)
            .collect()
    }

    fn grant(&mut self, txid: TransactionId, target: &LockTarget, mode: LockMode) {
        let entry = self
            .holders
            .entry(target.clone())
            .or_default()
            .entry(txid)
            .or_insert(mode);
        *entry = (*entry).max(mode);
        self.held.entry(txid).or_default().insert(target.clone());
    }

    /// Whether some transaction reachable from `txid`'s blockers waits on `txid`.
    fn closes_cycle(&self, txid: TransactionId) -> bool {
        let mut stack = self.successors(txid);
        let mut visited = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == txid {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.successors(next));
            }
        }
        false
    }

    fn successors(&self, txid: TransactionId) -> Vec<TransactionId> {
        self.waiting
            .get(&txid)
            .map(|(target, mode)| self.blockers(txid, target, *mode))
            .unwrap_or_default()
    }

    fn release_all(&mut self, txid: TransactionId) -> usize {
        self.waiting.remove(&txid);
        let Some(targets) = self.held.remove(&txid) else {
            return 0;
        };
        for target in &targets {
            if let Some(holders) = self.holders.get_mut(target) {
                holders.remove(&txid);
                if holders.is_empty() {
                    self.holders.remove(target);
                }
            }
        }
        targets.len()
    }
}

/// Grants and tracks transaction locks.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager whose waits give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquires `target` in `mode` for `txid`, blocking while it conflicts.
    ///
    /// Re-acquiring a held lock is a no-op; a shared holder asking for
    /// exclusive upgrades once it is the only holder.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DeadlockDetected`] if waiting would close a cycle. The
    ///   caller must release the transaction's locks.
    /// - [`CoreError::LockTimeout`] if the wait exceeds the configured timeout.
    pub fn acquire(&self, txid: TransactionId, target: &LockTarget, mode: LockMode) -> CoreResult<()> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut table = self.table.lock();

        loop {
            let blockers = table.blockers(txid, target, mode);
            if blockers.is_empty() {
                table.waiting.remove(&txid);
                table.grant(txid, target, mode);
                return Ok(());
            }

            table.waiting.insert(txid, (target.clone(), mode));
            if table.closes_cycle(txid) {
                table.waiting.remove(&txid);
                return Err(CoreError::DeadlockDetected {
                    txid: txid.to_string(),
                    target: target.to_string(),
                });
            }

            if Instant::now() >= deadline {
                table.waiting.remove(&txid);
                return Err(CoreError::LockTimeout {
                    txid: txid.to_string(),
                    target: target.to_string(),
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }

            tracing::trace!(%txid, %target, ?mode, ?blockers, "waiting for lock");
            let _ = self.released.wait_until(&mut table, deadline);
        }
    }

    /// Releases every lock held by `txid` and wakes all waiters.
    pub fn release_all(&self, txid: TransactionId) {
        let released = self.table.lock().release_all(txid);
        if released > 0 {
            tracing::trace!(%txid, released, "locks released");
        }
        self.released.notify_all();
    }

    /// The mode in which `txid` holds `target`, if any.
    #[must_use]
    pub fn held_mode(&self, txid: TransactionId, target: &LockTarget) -> Option<LockMode> {
        self.table
            .lock()
            .holders
            .get(target)
            .and_then(|holders| holders.get(&txid))
            .copied()
    }

    /// Number of locks currently held by `txid`.
    #[must_use]
    pub fn held_count(&self, txid: TransactionId) -> usize {
        self.table.lock().held.get(&txid).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn doc(id: &str) -> LockTarget {
        LockTarget::Document(DocumentKey::new("heroes", EntityId::from(id)))
    }

    fn txn(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn shared_locks_coexist() {
        let locks = LockManager::new(Duration::from_millis(50));
        locks.acquire(txn(1), &doc("a"), LockMode::Shared).unwrap();
        locks.acquire(txn(2), &doc("a"), LockMode::Shared).unwrap();
        assert_eq!(locks.held_mode(txn(2), &doc("a")), Some(LockMode::Shared));
    }

    #[test]
    fn exclusive_is_reentrant_and_covers_shared() {
        let locks = LockManager::new(Duration::from_millis(50));
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();
        locks.acquire(txn(1), &doc("a"), LockMode::Shared).unwrap();
        assert_eq!(locks.held_mode(txn(1), &doc("a")), Some(LockMode::Exclusive));
        assert_eq!(locks.held_count(txn(1)), 1);
    }

    #[test]
    fn sole_shared_holder_upgrades() {
        let locks = LockManager::new(Duration::from_millis(50));
        locks.acquire(txn(1), &doc("a"), LockMode::Shared).unwrap();
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();
        assert_eq!(locks.held_mode(txn(1), &doc("a")), Some(LockMode::Exclusive));
    }

    #[test]
    fn conflicting_request_times_out() {
        let locks = LockManager::new(Duration::from_millis(30));
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();
        let result = locks.acquire(txn(2), &doc("a"), LockMode::Shared);
        assert!(matches!(result, Err(CoreError::LockTimeout { .. })));
        assert_eq!(locks.held_mode(txn(2), &doc("a")), None);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let result = locks.acquire(txn(2), &doc("a"), LockMode::Exclusive);
                tx.send(()).unwrap();
                result
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        locks.release_all(txn(1));
        waiter.join().unwrap().unwrap();
        assert_eq!(locks.held_mode(txn(2), &doc("a")), Some(LockMode::Exclusive));
    }

    #[test]
    fn two_way_cycle_aborts_the_closing_request() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
        locks.acquire(txn(1), &doc("a"), LockMode::Exclusive).unwrap();
        locks.acquire(txn(2), &doc("b"), LockMode::Exclusive).unwrap();

        let first = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire(txn(1), &doc("b"), LockMode::Exclusive))
        };
        // let txn 1 start waiting on b
        while locks.table.lock().waiting.get(&txn(1)).is_none() {
            thread::yield_now();
        }

        let result = locks.acquire(txn(2), &doc("a"), LockMode::Exclusive);
        assert!(matches!(result, Err(CoreError::DeadlockDetected { .. })));

        locks.release_all(txn(2));
        first.join().unwrap().unwrap();
    }

    #[test]
    fn competing_upgrades_deadlock() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
        locks.acquire(txn(1), &doc("a"), LockMode::Shared).unwrap();
        locks.acquire(txn(2), &doc("a"), LockMode::Shared).unwrap();

        let first = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire(txn(1), &doc("a"), LockMode::Exclusive))
        };
        while locks.table.lock().waiting.get(&txn(1)).is_none() {
            thread::yield_now();
        }

        let result = locks.acquire(txn(2), &doc("a"), LockMode::Exclusive);
        assert!(matches!(result, Err(CoreError::DeadlockDetected { .. })));
        locks.release_all(txn(2));
        first.join().unwrap().unwrap();
    }

    #[test]
    fn predicate_targets_are_distinct_from_documents() {
        let locks = LockManager::new(Duration::from_millis(30));
        let predicate = LockTarget::Predicate {
            collection: "heroes".into(),
            fingerprint: "{}".into(),
        };
        locks.acquire(txn(1), &predicate, LockMode::Exclusive).unwrap();
        locks.acquire(txn(2), &doc("a"), LockMode::Exclusive).unwrap();
        assert!(locks.acquire(txn(2), &predicate, LockMode::Exclusive).is_err());
        assert!(predicate.to_string().starts_with("predicate heroes"));
    }
}
