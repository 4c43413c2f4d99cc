//! # FacetDB Storage
//!
//! Storage backends for the FacetDB commit journal.
//!
//! Backends are **opaque append-only byte stores**. They know nothing about
//! documents, collections or journal records; the core engine owns every
//! byte layout decision.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - shared in-memory bytes, for tests and ephemeral databases
//! - [`FileBackend`] - a single file on disk
//! - [`FaultyBackend`] - wraps another backend and simulates an unreachable store
//!
//! ## Example
//!
//! ```rust
//! use facetdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"batch").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"batch");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultyBackend, OutageSwitch};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
