//! CLI command implementations.

pub mod dump_journal;
pub mod export;
pub mod inspect;
pub mod verify;

use facetdb_core::{Config, DatabaseDir};
use facetdb_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Reads the whole journal of the database at `path` without locking it.
pub fn read_journal(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let journal_path = DatabaseDir::journal_path_in(path);
    if !journal_path.exists() {
        return Err(format!("No journal found at {}", journal_path.display()).into());
    }
    let backend = FileBackend::open(&journal_path)?;
    let size = usize::try_from(backend.size()?)?;
    Ok(backend.read_at(0, size)?)
}

/// Configuration for opening an existing database from the command line.
pub fn existing_database() -> Config {
    Config::new().create_if_missing(false).sync_on_commit(false)
}
