//! Database facade and recovery.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::entity::{Clock, Entity};
use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::{DocumentStore, StagedWrite};
use crate::transaction::{LockManager, LockMode, LockTarget, Transaction};
use crate::types::{DocumentKey, SequenceNumber, TransactionId};
use facetdb_codec::Document;
use facetdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// The main database handle.
///
/// `Database` is `Send + Sync`; share it by reference or `Arc` between the
/// threads serving facet calls. Used directly as a [`Session`] it runs in
/// autocommit mode: every save or delete is its own commit and concurrent
/// saves of one document are last-writer-wins. Use
/// [`Session::run_in_transaction`] for atomic, locked units of work.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use facetdb_core::{Database, Session};
/// use std::path::Path;
///
/// let db = Database::open(Path::new("game_data"))?;
/// let mut player = Player::named("John", 200);
/// db.save(&mut player)?;
/// ```
///
/// # In-Memory Databases
///
/// ```rust
/// use facetdb_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// assert_eq!(db.stats().saves, 0);
/// ```
pub struct Database {
    config: Config,
    /// Database directory (holds the lock). None for backend-only databases.
    dir: Option<DatabaseDir>,
    store: DocumentStore,
    schemas: SchemaRegistry,
    locks: LockManager,
    clock: Clock,
    stats: DatabaseStats,
    next_txid: AtomicU64,
}

impl Database {
    /// Opens a database from a directory path with the default configuration.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DatabaseLocked`] if another process holds the directory
    /// - [`CoreError::JournalCorruption`] or [`CoreError::ChecksumMismatch`]
    ///   if the journal is damaged
    /// - I/O errors
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`].
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open_with_create_dirs(&dir.journal_path())?;
        let mut db = Self::open_with_backend(config, Box::new(backend))?;
        tracing::info!(path = %dir.path().display(), "database opened");
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens a database over an arbitrary journal backend.
    ///
    /// # Errors
    ///
    /// Fails if the journal cannot be read or is damaged.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let recovered = DocumentStore::open(
            backend,
            config.sync_on_commit,
            config.document_size_warning,
        )?;
        let next_txid = recovered.highest_txid.map_or(1, |txid| txid.as_u64() + 1);
        let clock = Clock::new();
        if let Some(latest) = recovered.latest_update {
            clock.observe(latest);
        }

        Ok(Self {
            locks: LockManager::new(config.lock_wait_timeout),
            config,
            dir: None,
            store: recovered.store,
            schemas: SchemaRegistry::new(),
            clock,
            stats: DatabaseStats::new(),
            next_txid: AtomicU64::new(next_txid),
        })
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory of a file-backed database.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Registers the schema of `T`.
    ///
    /// Saving registers automatically; explicit registration makes the type
    /// known to [`crate::boundary`] before its first save.
    ///
    /// # Errors
    ///
    /// [`CoreError::SchemaConflict`] if `T::COLLECTION` is registered with a
    /// different schema, [`CoreError::SchemaViolation`] for an invalid schema.
    pub fn register<T: Entity>(&self) -> CoreResult<()> {
        if self.schemas.get(T::COLLECTION).is_none() {
            self.schemas.register(T::COLLECTION, T::schema())?;
        }
        Ok(())
    }

    /// The schema registry.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Names of collections that hold documents, sorted.
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        self.store.collection_names()
    }

    /// Number of stored documents in `collection`.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.store.count(collection)
    }

    /// Sequence of the last commit.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.store.last_sequence()
    }

    /// Size of the commit journal in bytes.
    #[must_use]
    pub fn journal_size(&self) -> u64 {
        self.store.journal_len()
    }

    /// Returns a snapshot of the statistics counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Begins a transaction.
    ///
    /// Prefer [`Session::run_in_transaction`], which commits, rolls back and
    /// retries for you.
    #[must_use]
    pub fn begin(&self) -> Transaction<'_> {
        let txid = self.allocate_txid();
        self.stats.record_transaction_start();
        tracing::debug!(%txid, "transaction started");
        Transaction::new(self, txid)
    }

    /// Runs `work` in a transaction with the configured retry budget.
    ///
    /// # Errors
    ///
    /// See [`Session::run_in_transaction`].
    pub fn transaction<R, F>(&self, work: F) -> CoreResult<R>
    where
        F: FnMut(&Transaction<'_>) -> CoreResult<R>,
    {
        self.run_in_transaction(self.config.default_max_retries, work)
    }

    pub(crate) fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub(crate) fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn stats_recorder(&self) -> &DatabaseStats {
        &self.stats
    }

    fn allocate_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    fn autocommit(&self, key: DocumentKey, write: StagedWrite) -> CoreResult<usize> {
        let txid = self.allocate_txid();
        let receipt = self.store.commit(txid, &[(key, write)], &HashMap::new())?;
        self.stats.record_bytes_written(receipt.bytes);
        Ok(receipt.removed)
    }
}

impl Session for Database {
    fn database(&self) -> &Database {
        self
    }

    fn load(&self, key: &DocumentKey) -> CoreResult<Option<Document>> {
        Ok(self.store.get(key)?.map(|stored| stored.document))
    }

    fn scan(&self, collection: &str) -> CoreResult<Vec<Document>> {
        Ok(self
            .store
            .scan(collection)?
            .into_iter()
            .map(|(_, stored)| stored.document)
            .collect())
    }

    fn insert_document(&self, key: DocumentKey, document: Document) -> CoreResult<()> {
        self.autocommit(key, StagedWrite::Insert(document)).map(|_| ())
    }

    fn replace_document(&self, key: DocumentKey, document: Document) -> CoreResult<()> {
        self.autocommit(key, StagedWrite::Put(document)).map(|_| ())
    }

    fn remove_document(&self, key: &DocumentKey) -> CoreResult<bool> {
        Ok(self.autocommit(key.clone(), StagedWrite::Delete)? > 0)
    }

    fn acquire(&self, _target: &LockTarget, _mode: LockMode) -> CoreResult<()> {
        Err(CoreError::NoActiveTransaction)
    }

    fn in_transaction(&self) -> bool {
        false
    }

    fn current_transaction(&self) -> Option<&Transaction<'_>> {
        None
    }

    fn run_in_transaction<R, F>(&self, max_retries: u32, mut work: F) -> CoreResult<R>
    where
        F: FnMut(&Transaction<'_>) -> CoreResult<R>,
    {
        let mut attempt = 0;
        loop {
            let txn = self.begin();
            let result = work(&txn).and_then(|value| txn.commit().map(|()| value));
            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let retryable = error.is_retryable() || txn.aborted_retryably();
            if let Err(rollback) = txn.rollback() {
                tracing::warn!(txid = %txn.id(), error = %rollback, "rollback failed");
            }
            drop(txn);

            if !retryable || attempt >= max_retries {
                return Err(error);
            }
            attempt += 1;
            self.stats.record_retry();
            tracing::warn!(attempt, max_retries, error = %error, "retrying transaction");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("committed_seq", &self.committed_seq())
            .field("collections", &self.collections())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Lifecycle;
    use crate::test_support::{Hero, Mount};
    use crate::Reference;
    use facetdb_storage::FaultyBackend;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn create_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn first_save_assigns_identity() {
        let db = create_db();
        let mut hero = Hero::named("John", 200);
        db.save(&mut hero).unwrap();

        let meta = hero.meta();
        assert_eq!(meta.lifecycle(), Lifecycle::Persisted);
        assert_eq!(meta.id().unwrap().as_str().len(), 32);
        assert_eq!(meta.created_at(), meta.updated_at());
        assert_eq!(db.count("heroes"), 1);
    }

    #[test]
    fn later_saves_advance_updated_at() {
        let db = create_db();
        let mut hero = Hero::named("John", 200);
        db.save(&mut hero).unwrap();
        let created = hero.meta().created_at();
        let mut last = hero.meta().updated_at();

        for coins in [250, 300, 350] {
            hero.coins = coins;
            db.save(&mut hero).unwrap();
            assert_eq!(hero.meta().created_at(), created);
            assert!(hero.meta().updated_at() > last);
            last = hero.meta().updated_at();
        }
        assert_eq!(db.find::<Hero>(hero.id().unwrap().clone()).unwrap().unwrap().coins, 350);
    }

    #[test]
    fn recovery_moves_clock_past_stored_timestamps() {
        let journal = InMemoryBackend::new();
        let db = Database::open_with_backend(Config::default(), Box::new(journal.clone())).unwrap();
        db.clock().observe(chrono::Utc::now() + chrono::Duration::hours(1));
        let mut hero = Hero::named("John", 1);
        db.save(&mut hero).unwrap();
        let stamped = hero.meta().updated_at().unwrap();
        drop(db);

        let db = Database::open_with_backend(Config::default(), Box::new(journal)).unwrap();
        assert!(db.clock().now() > stamped);
    }

    #[test]
    fn preset_id_conflict_leaves_instance_transient() {
        let db = create_db();
        let mut first = Hero::named("John", 1);
        first.meta_mut().preset_id("hero-1");
        db.save(&mut first).unwrap();

        let mut second = Hero::named("Jane", 2);
        second.meta_mut().preset_id("hero-1");
        let result = db.save(&mut second);
        assert!(matches!(result, Err(CoreError::IdentityConflict { .. })));
        assert_eq!(second.meta().lifecycle(), Lifecycle::Transient);
        assert!(second.meta().created_at().is_none());
    }

    #[test]
    fn delete_reports_whether_something_was_removed() {
        let db = create_db();
        let mut never_saved = Hero::named("Ghost", 0);
        assert!(!db.delete(&mut never_saved).unwrap());

        let mut hero = Hero::named("John", 200);
        db.save(&mut hero).unwrap();
        let id = hero.id().unwrap().clone();
        assert!(db.delete(&mut hero).unwrap());
        assert!(!db.delete(&mut hero).unwrap());
        assert_eq!(hero.meta().lifecycle(), Lifecycle::Stale);
        assert!(db.find::<Hero>(id).unwrap().is_none());
    }

    #[test]
    fn stale_instances_must_be_refreshed() {
        let db = create_db();
        let mut hero = Hero::named("John", 200);
        db.save(&mut hero).unwrap();
        db.delete(&mut hero).unwrap();

        assert!(matches!(db.save(&mut hero), Err(CoreError::StaleEntity { .. })));
        assert!(matches!(db.refresh(&mut hero), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn refresh_sees_other_writers() {
        let db = create_db();
        let mut mine = Hero::named("John", 200);
        db.save(&mut mine).unwrap();

        let mut theirs: Hero = db.find(mine.id().unwrap().clone()).unwrap().unwrap();
        theirs.coins = 999;
        db.save(&mut theirs).unwrap();

        db.refresh(&mut mine).unwrap();
        assert_eq!(mine.coins, 999);
        assert_eq!(mine.meta().updated_at(), theirs.meta().updated_at());
    }

    #[test]
    fn references_resolve_by_lookup() {
        let db = create_db();
        let mut mount = Mount {
            model: "Ducati".into(),
            ..Mount::default()
        };
        db.save(&mut mount).unwrap();

        let mut hero = Hero::named("John", 1);
        hero.mount = Reference::from(&mount);
        db.save(&mut hero).unwrap();

        let loaded: Hero = db.find(hero.id().unwrap().clone()).unwrap().unwrap();
        let resolved = db.resolve(&loaded.mount).unwrap().unwrap();
        assert_eq!(resolved.model, "Ducati");

        assert!(db.resolve(&Reference::<Mount>::null()).unwrap().is_none());
        assert!(db.resolve(&Reference::<Mount>::to("missing")).unwrap().is_none());
    }

    #[test]
    fn locking_outside_transaction_fails() {
        let db = create_db();
        let mut hero = Hero::named("John", 1);
        db.save(&mut hero).unwrap();
        assert!(matches!(
            db.lock_for_update(&mut hero),
            Err(CoreError::NoActiveTransaction)
        ));
    }

    #[test]
    fn transaction_commits_atomically() {
        let db = create_db();
        let ids = db
            .transaction(|txn| {
                let mut a = Hero::named("A", 1);
                let mut b = Hero::named("B", 2);
                txn.save(&mut a)?;
                txn.save(&mut b)?;
                assert_eq!(db.count("heroes"), 0);
                Ok((a.id().cloned(), b.id().cloned()))
            })
            .unwrap();
        assert_eq!(db.count("heroes"), 2);
        assert!(db.find::<Hero>(ids.0.unwrap()).unwrap().is_some());
        assert_eq!(db.stats().transactions_committed, 1);
    }

    #[test]
    fn failed_work_rolls_back() {
        let db = create_db();
        let result: CoreResult<()> = db.transaction(|txn| {
            txn.save(&mut Hero::named("A", 1))?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(db.count("heroes"), 0);
        assert_eq!(db.stats().retries, 0);
    }

    #[test]
    fn dropped_transaction_rolls_back_and_unlocks() {
        let db = create_db();
        let mut hero = Hero::named("John", 1);
        db.save(&mut hero).unwrap();
        {
            let txn = db.begin();
            txn.lock_for_update(&mut hero).unwrap();
            hero.coins = 5;
            txn.save(&mut hero).unwrap();
        }
        let fresh: Hero = db.find(hero.id().unwrap().clone()).unwrap().unwrap();
        assert_eq!(fresh.coins, 1);

        let txn = db.begin();
        txn.lock_for_update(&mut hero).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn nested_transactions_share_the_outer_scope() {
        let db = create_db();
        let result: CoreResult<()> = db.transaction(|outer| {
            outer.run_in_transaction(3, |inner| {
                assert_eq!(inner.id(), outer.id());
                inner.save(&mut Hero::named("Inner", 1))
            })?;
            Err(CoreError::invalid_operation("outer fails"))
        });
        assert!(result.is_err());
        assert_eq!(db.count("heroes"), 0);
    }

    #[test]
    fn write_conflict_is_retried() {
        let db = create_db();
        let mut hero = Hero::named("John", 1);
        db.save(&mut hero).unwrap();
        let id = hero.id().unwrap().clone();

        let mut attempts = 0;
        db.run_in_transaction(2, |txn| {
            attempts += 1;
            let mut mine: Hero = txn.find(id.clone())?.unwrap();
            if attempts == 1 {
                // an autocommit writer slips in between read and commit
                let mut other: Hero = db.find(id.clone())?.unwrap();
                other.coins = 100;
                db.save(&mut other)?;
            }
            mine.coins += 1;
            txn.save(&mut mine)
        })
        .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(db.find::<Hero>(id).unwrap().unwrap().coins, 101);
        let stats = db.stats();
        assert_eq!(stats.write_conflicts, 1);
        assert_eq!(stats.retries, 1);
    }

    #[test]
    fn lock_for_update_serializes_writers() {
        let db = Arc::new(create_db());
        let mut hero = Hero::named("John", 0);
        db.save(&mut hero).unwrap();
        let id = hero.id().unwrap().clone();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        db.transaction(|txn| {
                            let mut hero: Hero = txn.find(id.clone())?.unwrap();
                            txn.lock_for_update(&mut hero)?;
                            hero.coins += 1;
                            txn.save(&mut hero)
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(db.find::<Hero>(id).unwrap().unwrap().coins, 20);
    }

    #[test]
    fn storage_outage_surfaces_and_recovers() {
        let faulty = FaultyBackend::new(InMemoryBackend::new());
        let switch = faulty.switch();
        let db = Database::open_with_backend(Config::default(), Box::new(faulty)).unwrap();

        let mut hero = Hero::named("John", 1);
        db.save(&mut hero).unwrap();

        switch.take_offline();
        hero.coins = 2;
        assert!(matches!(db.save(&mut hero), Err(CoreError::StorageUnavailable(_))));
        assert_eq!(hero.meta().lifecycle(), Lifecycle::Stale);
        assert!(db.find::<Hero>(hero.id().unwrap().clone()).is_err());

        switch.bring_online();
        db.refresh(&mut hero).unwrap();
        assert_eq!(hero.coins, 1);
        assert_eq!(hero.meta().lifecycle(), Lifecycle::Persisted);
    }

    #[test]
    fn outage_inside_transaction_rolls_back() {
        let faulty = FaultyBackend::new(InMemoryBackend::new());
        let switch = faulty.switch();
        let db = Database::open_with_backend(
            Config::default().lock_wait_timeout(Duration::from_millis(100)),
            Box::new(faulty),
        )
        .unwrap();

        let result: CoreResult<()> = db.transaction(|txn| {
            txn.save(&mut Hero::named("A", 1))?;
            switch.take_offline();
            txn.save(&mut Hero::named("B", 2))
        });
        assert!(matches!(result, Err(CoreError::StorageUnavailable(_))));

        switch.bring_online();
        assert_eq!(db.count("heroes"), 0);
        assert_eq!(db.stats().transactions_aborted, 1);
    }
}
