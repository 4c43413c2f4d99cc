//! # FacetDB Core
//!
//! Entity persistence, query and transaction engine for game backends.
//!
//! Game state lives in typed entities. Each entity type declares a
//! [`Schema`] and a collection name; instances are stored as documents in a
//! crash-safe commit journal and read back through typed lookups, filtered
//! queries and reference resolution.
//!
//! ## Operations
//!
//! Everything goes through a [`Session`]:
//!
//! - [`Database`] runs each write as its own commit
//! - [`Transaction`] buffers writes, holds document locks and commits atomically
//!
//! [`Session::run_in_transaction`] re-runs the unit of work after a deadlock
//! or write conflict, up to a retry budget.
//!
//! ## Example
//!
//! ```rust
//! use facetdb_core::{
//!     field, Attributes, CoreResult, Database, Entity, EntityMeta, FieldKind, Schema, Session,
//! };
//!
//! #[derive(Debug, Default)]
//! struct Player {
//!     meta: EntityMeta,
//!     name: String,
//!     coins: i64,
//! }
//!
//! impl Entity for Player {
//!     const COLLECTION: &'static str = "players";
//!
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field("name", FieldKind::Text)
//!             .field("coins", FieldKind::Integer)
//!     }
//!
//!     fn meta(&self) -> &EntityMeta {
//!         &self.meta
//!     }
//!
//!     fn meta_mut(&mut self) -> &mut EntityMeta {
//!         &mut self.meta
//!     }
//!
//!     fn to_attributes(&self) -> Attributes {
//!         Attributes::new().with("name", &self.name).with("coins", self.coins)
//!     }
//!
//!     fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
//!         self.name = attrs.get("name")?;
//!         self.coins = attrs.get("coins")?;
//!         Ok(())
//!     }
//! }
//!
//! let db = Database::open_in_memory().unwrap();
//! let mut john = Player { name: "John".into(), coins: 200, ..Default::default() };
//! db.save(&mut john).unwrap();
//!
//! db.transaction(|txn| {
//!     let mut player = txn.find::<Player>(john.id().unwrap().clone())?.unwrap();
//!     txn.lock_for_update(&mut player)?;
//!     player.coins += 50;
//!     txn.save(&mut player)
//! })
//! .unwrap();
//!
//! let rich = db.query::<Player>().filter(field("coins").greater_than(100)).get().unwrap();
//! assert_eq!(rich[0].coins, 250);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod boundary;
mod config;
mod database;
mod dir;
mod entity;
mod error;
pub mod journal;
pub mod query;
mod reference;
pub mod schema;
mod session;
mod stats;
mod store;
pub mod transaction;
mod types;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use database::Database;
pub use dir::DatabaseDir;
pub use entity::{Clock, Entity, EntityId, EntityMeta, Lifecycle};
pub use error::{CoreError, CoreResult};
pub use query::{field, literal, Expr, Query};
pub use reference::Reference;
pub use schema::{
    from_document, to_document, Attributes, Field, FieldKind, FromValue, Schema, SchemaRegistry,
    ToValue,
};
pub use session::Session;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{LockMode, LockTarget, Transaction, TransactionState};
pub use types::{DocumentKey, SequenceNumber, TransactionId};

pub use facetdb_codec::{Document, Value};

/// Version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
