//! Transaction state and the transactional session.

use crate::database::Database;
use crate::entity::Outcome;
use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::store::StagedWrite;
use crate::transaction::lock::{LockMode, LockTarget};
use crate::types::{DocumentKey, SequenceNumber, TransactionId};
use facetdb_codec::Document;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

#[derive(Debug)]
struct TxnInner {
    state: TransactionState,
    /// Buffered writes, applied in key order at commit.
    writes: BTreeMap<DocumentKey, StagedWrite>,
    /// Revision of each document when last read (`None` for absent).
    reads: HashMap<DocumentKey, Option<SequenceNumber>>,
    /// Why the transaction was aborted, and whether a retry may succeed.
    abort: Option<(String, bool)>,
}

impl TxnInner {
    fn ensure_active(&self) -> CoreResult<()> {
        match (self.state, &self.abort) {
            (TransactionState::Active, _) => Ok(()),
            (TransactionState::Aborted, Some((reason, _))) => {
                Err(CoreError::transaction_aborted(reason.clone()))
            }
            (TransactionState::Aborted, None) => {
                Err(CoreError::transaction_aborted("rolled back"))
            }
            (TransactionState::Committed, _) => {
                Err(CoreError::invalid_operation("transaction already committed"))
            }
        }
    }

    fn record_read(&mut self, key: &DocumentKey, revision: Option<SequenceNumber>) {
        if !self.writes.contains_key(key) {
            self.reads.insert(key.clone(), revision);
        }
    }
}

/// A unit of work with atomic commit or full rollback.
///
/// Writes are buffered and journaled as one batch on [`Transaction::commit`].
/// Every write first takes an exclusive lock on its document; locks are held
/// until the transaction ends. A transaction dropped while active is rolled
/// back.
///
/// Storage failures, deadlocks and lock timeouts roll the transaction back
/// before the error is returned; later operations fail with
/// [`CoreError::TransactionAborted`].
pub struct Transaction<'db> {
    db: &'db Database,
    id: TransactionId,
    outcome: Outcome,
    inner: Mutex<TxnInner>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, id: TransactionId) -> Self {
        Self {
            db,
            id,
            outcome: Outcome::default(),
            inner: Mutex::new(TxnInner {
                state: TransactionState::Active,
                writes: BTreeMap::new(),
                reads: HashMap::new(),
                abort: None,
            }),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Shared with the instances this transaction writes, which revert if
    /// it aborts.
    pub(crate) fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// Commits the buffered writes atomically and releases all locks.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WriteConflict`] if a written document changed since it
    ///   was read here
    /// - [`CoreError::IdentityConflict`] if an inserted id was taken meanwhile
    /// - [`CoreError::StorageUnavailable`] if the journal append failed
    ///
    /// On error nothing is applied and the transaction is rolled back.
    pub fn commit(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_active()?;

        let writes: Vec<(DocumentKey, StagedWrite)> =
            std::mem::take(&mut inner.writes).into_iter().collect();
        let result = self.db.store().commit(self.id, &writes, &inner.reads);
        inner.reads.clear();
        self.db.locks().release_all(self.id);

        let stats = self.db.stats_recorder();
        match result {
            Ok(receipt) => {
                inner.state = TransactionState::Committed;
                self.outcome.resolve(true);
                stats.record_transaction_commit();
                stats.record_bytes_written(receipt.bytes);
                tracing::debug!(txid = %self.id, sequence = ?receipt.sequence, "transaction committed");
                Ok(())
            }
            Err(e) => {
                if matches!(e, CoreError::WriteConflict { .. }) {
                    stats.record_write_conflict();
                    tracing::warn!(txid = %self.id, error = %e, "commit rejected");
                }
                inner.state = TransactionState::Aborted;
                inner.abort = Some((e.to_string(), e.is_retryable()));
                self.outcome.resolve(false);
                stats.record_transaction_abort();
                Err(e)
            }
        }
    }

    /// Discards the buffered writes and releases all locks.
    ///
    /// Rolling back an already aborted transaction is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] after a commit.
    pub fn rollback(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            TransactionState::Active => {
                self.abort_locked(&mut inner, "rolled back".to_string(), false);
                Ok(())
            }
            TransactionState::Aborted => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "cannot roll back a committed transaction",
            )),
        }
    }

    /// Whether the transaction was aborted by a failure a retry may avoid.
    pub(crate) fn aborted_retryably(&self) -> bool {
        matches!(self.inner.lock().abort, Some((_, true)))
    }

    fn abort_locked(&self, inner: &mut TxnInner, reason: String, retryable: bool) {
        inner.writes.clear();
        inner.reads.clear();
        inner.state = TransactionState::Aborted;
        inner.abort = Some((reason, retryable));
        self.outcome.resolve(false);
        self.db.locks().release_all(self.id);
        self.db.stats_recorder().record_transaction_abort();
        tracing::debug!(txid = %self.id, "transaction rolled back");
    }

    /// Runs `op` against the active state, rolling back on failures that
    /// leave the transaction unusable.
    fn with_active<R>(&self, op: impl FnOnce(&mut TxnInner) -> CoreResult<R>) -> CoreResult<R> {
        let mut inner = self.inner.lock();
        inner.ensure_active()?;
        let result = op(&mut inner);
        if let Err(e) = &result {
            if matches!(
                e,
                CoreError::StorageUnavailable(_)
                    | CoreError::DeadlockDetected { .. }
                    | CoreError::LockTimeout { .. }
            ) {
                self.abort_locked(&mut inner, e.to_string(), e.is_retryable());
            }
        }
        result
    }

    fn lock_document(&self, key: &DocumentKey) -> CoreResult<()> {
        self.lock(&LockTarget::Document(key.clone()), LockMode::Exclusive)
    }

    fn lock(&self, target: &LockTarget, mode: LockMode) -> CoreResult<()> {
        let result = self.db.locks().acquire(self.id, target, mode);
        if let Err(e) = &result {
            if matches!(e, CoreError::DeadlockDetected { .. }) {
                self.db.stats_recorder().record_deadlock();
                tracing::warn!(txid = %self.id, %target, "deadlock detected, rolling back");
            }
        }
        result
    }
}

impl Session for Transaction<'_> {
    fn database(&self) -> &Database {
        self.db
    }

    fn load(&self, key: &DocumentKey) -> CoreResult<Option<Document>> {
        self.with_active(|inner| {
            match inner.writes.get(key) {
                Some(StagedWrite::Insert(doc) | StagedWrite::Put(doc)) => {
                    return Ok(Some(doc.clone()))
                }
                Some(StagedWrite::Delete) => return Ok(None),
                None => {}
            }
            let stored = self.db.store().get(key)?;
            inner.record_read(key, stored.as_ref().map(|s| s.revision));
            Ok(stored.map(|s| s.document))
        })
    }

    fn scan(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.with_active(|inner| {
            let mut documents = HashMap::new();
            for (id, stored) in self.db.store().scan(collection)? {
                let key = DocumentKey::new(collection, id);
                inner.record_read(&key, Some(stored.revision));
                documents.insert(key, stored.document);
            }
            for (key, write) in inner.writes.iter().filter(|(k, _)| k.collection == collection) {
                match write {
                    StagedWrite::Insert(doc) | StagedWrite::Put(doc) => {
                        documents.insert(key.clone(), doc.clone());
                    }
                    StagedWrite::Delete => {
                        documents.remove(key);
                    }
                }
            }
            Ok(documents.into_values().collect())
        })
    }

    fn insert_document(&self, key: DocumentKey, document: Document) -> CoreResult<()> {
        self.with_active(|inner| {
            self.lock_document(&key)?;
            let write = match inner.writes.get(&key) {
                Some(StagedWrite::Insert(_) | StagedWrite::Put(_)) => {
                    return Err(CoreError::IdentityConflict {
                        collection: key.collection.clone(),
                        id: key.id.to_string(),
                    })
                }
                Some(StagedWrite::Delete) => StagedWrite::Put(document),
                None => {
                    if self.db.store().get(&key)?.is_some() {
                        return Err(CoreError::IdentityConflict {
                            collection: key.collection.clone(),
                            id: key.id.to_string(),
                        });
                    }
                    StagedWrite::Insert(document)
                }
            };
            inner.writes.insert(key, write);
            Ok(())
        })
    }

    fn replace_document(&self, key: DocumentKey, document: Document) -> CoreResult<()> {
        self.with_active(|inner| {
            self.lock_document(&key)?;
            let write = match inner.writes.get(&key) {
                Some(StagedWrite::Insert(_)) => StagedWrite::Insert(document),
                _ => StagedWrite::Put(document),
            };
            inner.writes.insert(key, write);
            Ok(())
        })
    }

    fn remove_document(&self, key: &DocumentKey) -> CoreResult<bool> {
        self.with_active(|inner| {
            self.lock_document(key)?;
            match inner.writes.get(key) {
                Some(StagedWrite::Insert(_)) => {
                    inner.writes.remove(key);
                    Ok(true)
                }
                Some(StagedWrite::Put(_)) => {
                    inner.writes.insert(key.clone(), StagedWrite::Delete);
                    Ok(true)
                }
                Some(StagedWrite::Delete) => Ok(false),
                None => {
                    let exists = self.db.store().get(key)?.is_some();
                    if exists {
                        inner.writes.insert(key.clone(), StagedWrite::Delete);
                    }
                    Ok(exists)
                }
            }
        })
    }

    fn acquire(&self, target: &LockTarget, mode: LockMode) -> CoreResult<()> {
        self.with_active(|_| self.lock(target, mode))
    }

    fn in_transaction(&self) -> bool {
        true
    }

    fn current_transaction(&self) -> Option<&Transaction<'_>> {
        Some(self)
    }

    /// Runs `work` inside this transaction: nested scopes share the
    /// outermost transaction and never retry on their own.
    fn run_in_transaction<R, F>(&self, _max_retries: u32, mut work: F) -> CoreResult<R>
    where
        F: FnMut(&Transaction<'_>) -> CoreResult<R>,
    {
        self.with_active(|_| Ok(()))?;
        work(self)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.state == TransactionState::Active {
            self.abort_locked(&mut inner, "dropped while active".to_string(), false);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("pending_writes", &inner.writes.len())
            .finish_non_exhaustive()
    }
}
