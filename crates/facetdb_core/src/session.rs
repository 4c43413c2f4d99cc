//! The storage context handed to facet handlers.
//!
//! [`Session`] is implemented by [`Database`] (autocommit: every write is its
//! own commit, last writer wins) and by [`Transaction`] (writes buffered,
//! locks held, atomic commit). Handlers written against `&impl Session` run
//! unchanged in either context.

use crate::database::Database;
use crate::entity::{Entity, EntityId, EntityMeta, Lifecycle, Outcome};
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::reference::Reference;
use crate::schema::{from_document, stamp_document, to_document};
use crate::transaction::{LockMode, LockTarget, Transaction};
use crate::types::DocumentKey;
use facetdb_codec::Document;

/// Storage context for entity operations.
///
/// The required methods work on raw documents and locks; the provided
/// methods build the typed entity operations on top of them.
pub trait Session {
    /// The database behind this session.
    fn database(&self) -> &Database;

    /// Point lookup of a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if storage is unreachable.
    fn load(&self, key: &DocumentKey) -> CoreResult<Option<Document>>;

    /// Every document of a collection, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if storage is unreachable.
    fn scan(&self, collection: &str) -> CoreResult<Vec<Document>>;

    /// Stores a new document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IdentityConflict`] if the key is taken.
    fn insert_document(&self, key: DocumentKey, document: Document) -> CoreResult<()>;

    /// Stores a document, replacing whatever is stored under the key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if storage is unreachable.
    fn replace_document(&self, key: DocumentKey, document: Document) -> CoreResult<()>;

    /// Removes a document; returns whether one was stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if storage is unreachable.
    fn remove_document(&self, key: &DocumentKey) -> CoreResult<bool>;

    /// Takes a lock for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoActiveTransaction`] outside a transaction, otherwise
    /// [`CoreError::DeadlockDetected`] or [`CoreError::LockTimeout`].
    fn acquire(&self, target: &LockTarget, mode: LockMode) -> CoreResult<()>;

    /// Whether writes are buffered in a transaction.
    fn in_transaction(&self) -> bool;

    /// The transaction writes are buffered in, if any.
    fn current_transaction(&self) -> Option<&Transaction<'_>>;

    /// Runs `work` atomically.
    ///
    /// On the database this begins a transaction, commits it when `work`
    /// succeeds, and re-runs `work` up to `max_retries` times after a
    /// retryable abort. Inside a transaction `work` joins the current one.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt; the transaction is rolled back.
    fn run_in_transaction<R, F>(&self, max_retries: u32, work: F) -> CoreResult<R>
    where
        Self: Sized,
        F: FnMut(&Transaction<'_>) -> CoreResult<R>;

    /// Loads the entity stored under `id`.
    ///
    /// # Errors
    ///
    /// Fails if storage is unreachable or the document does not fit the schema.
    fn find<T: Entity>(&self, id: impl Into<EntityId>) -> CoreResult<Option<T>>
    where
        Self: Sized,
    {
        let key = DocumentKey::of::<T>(id.into());
        self.load(&key)?
            .map(|doc| from_document::<T>(&doc))
            .transpose()
    }

    /// Inserts a transient entity or overwrites a persisted one.
    ///
    /// A first save assigns the id (unless preset) and sets both timestamps
    /// to the same instant; later saves only move `updated_at` forward.
    /// A failed first save leaves the instance untouched; a failed overwrite
    /// leaves it [`Lifecycle::Stale`]. Inside a transaction these changes to
    /// the instance are undone if the transaction rolls back.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StaleEntity`] for a stale instance
    /// - [`CoreError::IdentityConflict`] if a preset id is taken
    /// - [`CoreError::SchemaViolation`] if an attribute does not fit
    /// - [`CoreError::StorageUnavailable`] if storage is unreachable
    fn save<T: Entity>(&self, entity: &mut T) -> CoreResult<()>
    where
        Self: Sized,
    {
        let db = self.database();
        db.register::<T>()?;
        let meta = entity.meta().settled();
        let outcome = pending_outcome(self);

        match meta.lifecycle() {
            Lifecycle::Stale => Err(CoreError::StaleEntity {
                collection: T::COLLECTION.to_string(),
                id: meta.id().map(ToString::to_string).unwrap_or_default(),
            }),
            Lifecycle::Transient => {
                let id = meta.id().cloned().unwrap_or_else(EntityId::generate);
                let mut doc = to_document(entity)?;
                let now = db.clock().now();
                stamp_document(&mut doc, &id, now, now);
                self.insert_document(DocumentKey::of::<T>(id.clone()), doc)?;

                tracing::debug!(collection = T::COLLECTION, %id, "entity inserted");
                entity
                    .meta_mut()
                    .stage(EntityMeta::persisted(id, now, now), outcome.as_ref());
                db.stats_recorder().record_save(true);
                Ok(())
            }
            Lifecycle::Persisted => {
                let (Some(id), Some(created_at)) = (meta.id().cloned(), meta.created_at()) else {
                    return Err(CoreError::invalid_operation(
                        "persisted entity without identity",
                    ));
                };
                let mut doc = to_document(entity)?;
                if let Some(updated_at) = meta.updated_at() {
                    db.clock().observe(updated_at);
                }
                let now = db.clock().now();
                stamp_document(&mut doc, &id, created_at, now);

                let key = DocumentKey::of::<T>(id.clone());
                if let Err(e) = self.replace_document(key, doc) {
                    entity.meta_mut().stage(meta.into_stale(), outcome.as_ref());
                    return Err(e);
                }
                entity
                    .meta_mut()
                    .stage(EntityMeta::persisted(id, created_at, now), outcome.as_ref());
                db.stats_recorder().record_save(false);
                Ok(())
            }
        }
    }

    /// Removes the stored document of `entity`.
    ///
    /// Returns `false` for instances that were never persisted or whose
    /// document is already gone. Afterwards the instance is stale.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if storage is unreachable.
    fn delete<T: Entity>(&self, entity: &mut T) -> CoreResult<bool>
    where
        Self: Sized,
    {
        let meta = entity.meta();
        let Some(id) = meta.id().cloned() else {
            return Ok(false);
        };
        if meta.lifecycle() == Lifecycle::Transient {
            return Ok(false);
        }

        let removed = self.remove_document(&DocumentKey::of::<T>(id.clone()))?;
        let stale = entity.meta().settled().into_stale();
        entity.meta_mut().stage(stale, pending_outcome(self).as_ref());
        if removed {
            self.database().stats_recorder().record_delete();
            tracing::debug!(collection = T::COLLECTION, %id, "entity deleted");
        }
        Ok(removed)
    }

    /// Reloads attributes and timestamps from storage.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the document is gone; the instance is
    ///   then stale
    /// - [`CoreError::InvalidOperation`] for an instance without id
    fn refresh<T: Entity>(&self, entity: &mut T) -> CoreResult<()>
    where
        Self: Sized,
    {
        let Some(id) = entity.meta().id().cloned() else {
            return Err(CoreError::invalid_operation(
                "cannot refresh an entity that has no id",
            ));
        };

        match self.load(&DocumentKey::of::<T>(id.clone()))? {
            Some(doc) => {
                let mut loaded: T = from_document(&doc)?;
                let next = std::mem::replace(loaded.meta_mut(), entity.meta().clone());
                loaded.meta_mut().stage(next, pending_outcome(self).as_ref());
                *entity = loaded;
                self.database().stats_recorder().record_refresh();
                Ok(())
            }
            None => {
                let stale = entity.meta().settled().into_stale();
                entity.meta_mut().stage(stale, pending_outcome(self).as_ref());
                Err(CoreError::not_found(T::COLLECTION, id.as_str()))
            }
        }
    }

    /// Starts a query over `T`'s collection.
    fn query<T: Entity>(&self) -> Query<'_, T, Self>
    where
        Self: Sized,
    {
        Query::new(self)
    }

    /// Follows a reference. Null and dangling references yield `None`.
    ///
    /// # Errors
    ///
    /// Fails if storage is unreachable or the target does not fit its schema.
    fn resolve<T: Entity>(&self, reference: &Reference<T>) -> CoreResult<Option<T>>
    where
        Self: Sized,
    {
        match reference.id() {
            None => Ok(None),
            Some(id) => self.find(id.clone()),
        }
    }

    /// Takes an exclusive lock on `entity`'s document, then refreshes it.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoActiveTransaction`] outside a transaction, a lock
    /// error, or a refresh error.
    fn lock_for_update<T: Entity>(&self, entity: &mut T) -> CoreResult<()>
    where
        Self: Sized,
    {
        lock_and_refresh(self, entity, LockMode::Exclusive)
    }

    /// Takes a shared lock on `entity`'s document, then refreshes it.
    ///
    /// # Errors
    ///
    /// Same as [`Session::lock_for_update`].
    fn lock_shared<T: Entity>(&self, entity: &mut T) -> CoreResult<()>
    where
        Self: Sized,
    {
        lock_and_refresh(self, entity, LockMode::Shared)
    }
}

fn pending_outcome<S: Session>(session: &S) -> Option<Outcome> {
    session.current_transaction().map(|txn| txn.outcome().clone())
}

fn lock_and_refresh<S: Session, T: Entity>(
    session: &S,
    entity: &mut T,
    mode: LockMode,
) -> CoreResult<()> {
    if !session.in_transaction() {
        return Err(CoreError::NoActiveTransaction);
    }
    let Some(id) = entity.meta().id().cloned() else {
        return Err(CoreError::invalid_operation(
            "cannot lock an entity that has no id",
        ));
    };
    session.acquire(
        &LockTarget::Document(DocumentKey::of::<T>(id)),
        mode,
    )?;
    session.refresh(entity)
}
