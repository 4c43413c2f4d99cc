//! # FacetDB Testkit
//!
//! Test utilities for FacetDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Sample game entities (players, motorbikes, nested stats)
//! - Property-based test generators using proptest
//! - Crash simulation over journal images
//! - Concurrent stress drivers
//!
//! The cross-crate integration suites live in this crate's `tests/`.
//!
//! ## Usage
//!
//! ```rust
//! use facetdb_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let mut john = Player::new("John", 200);
//!     db.save(&mut john).unwrap();
//!     assert!(john.id().is_some());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod entities;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use facetdb_core::{field, Entity, Session};
}

pub use crash::*;
pub use entities::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
