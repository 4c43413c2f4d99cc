//! Entity types, identity and lifecycle.
//!
//! An entity is a Rust type with a declared [`Schema`] that lives in the
//! collection named by [`Entity::COLLECTION`]. Every instance carries an
//! [`EntityMeta`] holding its id, timestamps and lifecycle state; the
//! persistence layer is the only writer of that metadata.

mod clock;
mod id;

pub use clock::Clock;
pub use id::EntityId;

use crate::error::CoreResult;
use crate::reference::Reference;
use crate::schema::{Attributes, Schema};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where an instance stands relative to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Never persisted; has no stored document.
    #[default]
    Transient,
    /// Mirrors a stored document as of its last save or refresh.
    Persisted,
    /// Deleted, or out of sync after a failed write. Must be refreshed.
    Stale,
}

/// Fate of a transaction, shared with the instances it wrote.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outcome(Arc<AtomicU8>);

impl Outcome {
    const PENDING: u8 = 0;
    const COMMITTED: u8 = 1;
    const ABORTED: u8 = 2;

    pub(crate) fn resolve(&self, committed: bool) {
        let state = if committed { Self::COMMITTED } else { Self::ABORTED };
        // first resolution wins
        let _ = self
            .0
            .compare_exchange(Self::PENDING, state, Ordering::AcqRel, Ordering::Acquire);
    }

    fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire) == Self::ABORTED
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Metadata written inside a transaction that has not committed yet, with
/// the metadata to fall back to if it aborts.
#[derive(Debug, Clone)]
struct Provisional {
    outcome: Outcome,
    prior: Box<EntityMeta>,
}

/// Identity, timestamps and lifecycle of one entity instance.
///
/// Metadata written inside a transaction reverts to its pre-transaction
/// value once that transaction aborts, so a rolled-back first save leaves
/// the instance transient again.
#[derive(Debug, Clone, Default)]
pub struct EntityMeta {
    id: Option<EntityId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    lifecycle: Lifecycle,
    provisional: Option<Provisional>,
}

impl EntityMeta {
    /// Metadata of a fresh, transient instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata of a transient instance that will be stored under `id`.
    #[must_use]
    pub fn with_id(id: impl Into<EntityId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// The instance's id, `None` until first persisted unless preset.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.effective().id.as_ref()
    }

    /// When the document was first stored.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.effective().created_at
    }

    /// When the document was last stored.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.effective().updated_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.effective().lifecycle
    }

    /// Presets the id of a transient instance.
    ///
    /// Returns `false` and leaves the id untouched once the instance has
    /// been persisted: ids are never reassigned.
    pub fn preset_id(&mut self, id: impl Into<EntityId>) -> bool {
        *self = self.settled();
        if self.lifecycle == Lifecycle::Transient {
            self.id = Some(id.into());
            true
        } else {
            false
        }
    }

    pub(crate) fn persisted(
        id: EntityId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            lifecycle: Lifecycle::Persisted,
            provisional: None,
        }
    }

    pub(crate) fn into_stale(mut self) -> Self {
        self.lifecycle = Lifecycle::Stale;
        self
    }

    /// The metadata as it stands now, without pending-transaction history.
    pub(crate) fn settled(&self) -> Self {
        let mut meta = self.effective().clone();
        meta.provisional = None;
        meta
    }

    /// Replaces the metadata with `next`.
    ///
    /// With an `outcome` the change is tied to that transaction: the state
    /// before its first change is kept and restored if it aborts.
    pub(crate) fn stage(&mut self, next: Self, outcome: Option<&Outcome>) {
        let prior = self.settled();
        let provisional = outcome.map(|outcome| match self.provisional.take() {
            Some(p) if p.outcome.same(outcome) && !p.outcome.is_aborted() => p,
            _ => Provisional {
                outcome: outcome.clone(),
                prior: Box::new(prior),
            },
        });
        *self = next.settled();
        self.provisional = provisional;
    }

    fn effective(&self) -> &Self {
        match &self.provisional {
            Some(p) if p.outcome.is_aborted() => &p.prior,
            _ => self,
        }
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.effective(), other.effective());
        a.id == b.id
            && a.created_at == b.created_at
            && a.updated_at == b.updated_at
            && a.lifecycle == b.lifecycle
    }
}

/// A persistable entity type.
///
/// # Example
///
/// ```rust
/// use facetdb_core::{Attributes, CoreResult, Entity, EntityMeta, FieldKind, Schema};
///
/// #[derive(Debug, Default)]
/// struct Player {
///     meta: EntityMeta,
///     name: String,
///     coins: i64,
/// }
///
/// impl Entity for Player {
///     const COLLECTION: &'static str = "players";
///
///     fn schema() -> Schema {
///         Schema::new()
///             .field("name", FieldKind::Text)
///             .field("coins", FieldKind::Integer)
///     }
///
///     fn meta(&self) -> &EntityMeta {
///         &self.meta
///     }
///
///     fn meta_mut(&mut self) -> &mut EntityMeta {
///         &mut self.meta
///     }
///
///     fn to_attributes(&self) -> Attributes {
///         Attributes::new()
///             .with("name", &self.name)
///             .with("coins", self.coins)
///     }
///
///     fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
///         self.name = attrs.get("name")?;
///         self.coins = attrs.get("coins")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sized + 'static {
    /// Collection (entity type) name. Immutable once documents exist.
    const COLLECTION: &'static str;

    /// Declares the persisted attributes.
    fn schema() -> Schema;

    /// Returns the instance metadata.
    fn meta(&self) -> &EntityMeta;

    /// Returns the instance metadata for the persistence layer to update.
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Captures the declared attributes. Undeclared names are dropped on save.
    fn to_attributes(&self) -> Attributes;

    /// Overwrites the attributes from a schema-checked map.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if an attribute has an unexpected type.
    fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()>;

    /// Shortcut for `self.meta().id()`.
    fn id(&self) -> Option<&EntityId> {
        self.meta().id()
    }

    /// A reference to this instance (null while it has no id).
    fn to_reference(&self) -> Reference<Self> {
        Reference::from_id(self.meta().id().cloned())
    }
}
