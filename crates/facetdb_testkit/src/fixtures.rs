//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use facetdb_core::{Config, Database};
use facetdb_storage::{FaultyBackend, InMemoryBackend, OutageSwitch};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// Shared view of the journal bytes, for in-memory databases.
    journal: Option<InMemoryBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates an in-memory test database with a custom configuration.
    pub fn memory_with_config(config: Config) -> Self {
        let journal = InMemoryBackend::new();
        let db = Database::open_with_backend(config, Box::new(journal.clone()))
            .expect("Failed to open in-memory database");
        Self {
            db,
            journal: Some(journal),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open file database");
        Self {
            db,
            journal: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory database whose storage can be taken offline.
    pub fn faulty() -> (Self, OutageSwitch) {
        let journal = InMemoryBackend::new();
        let backend = FaultyBackend::new(journal.clone());
        let switch = backend.switch();
        let db = Database::open_with_backend(Config::default(), Box::new(backend))
            .expect("Failed to open faulty database");
        let test_db = Self {
            db,
            journal: Some(journal),
            temp_dir: None,
        };
        (test_db, switch)
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Returns a copy of the journal bytes of an in-memory database.
    pub fn journal_image(&self) -> Option<Vec<u8>> {
        self.journal.as_ref().map(InMemoryBackend::snapshot)
    }

    /// Closes the database and opens it again from the same storage.
    pub fn reopen(self) -> Self {
        let config = self.db.config().clone();
        let Self {
            db,
            journal,
            temp_dir,
        } = self;
        drop(db);

        let db = match (&journal, &temp_dir) {
            (Some(journal), _) => Database::open_with_backend(config, Box::new(journal.clone())),
            (None, Some(dir)) => Database::open_with_config(dir.path(), config),
            (None, None) => unreachable!("test database without storage"),
        }
        .expect("Failed to reopen database");

        Self {
            db,
            journal,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use facetdb_testkit::{with_temp_db, Player};
/// use facetdb_core::Session;
///
/// with_temp_db(|db| {
///     db.save(&mut Player::new("John", 200)).unwrap();
///     assert_eq!(db.count("players"), 1);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use crate::entities::{Motorbike, Player};
    use facetdb_core::{Entity, Session};

    /// Creates a database holding `count` players named `player-<n>`, each
    /// with `coins` coins.
    pub fn roster(count: usize, coins: i64) -> (TestDatabase, Vec<Player>) {
        let test_db = TestDatabase::memory();
        let players = (0..count)
            .map(|n| {
                let mut player = Player::new(&format!("player-{n}"), coins);
                test_db.db.save(&mut player).expect("Failed to save player");
                player
            })
            .collect();
        (test_db, players)
    }

    /// Saves a motorbike and a player riding it.
    pub fn rider(db: &Database, name: &str, model: &str) -> (Player, Motorbike) {
        let mut bike = Motorbike::new(model, 180.0);
        db.save(&mut bike).expect("Failed to save motorbike");
        let mut player = Player::new(name, 0);
        player.mount = bike.to_reference();
        db.save(&mut player).expect("Failed to save player");
        (player, bike)
    }
}
