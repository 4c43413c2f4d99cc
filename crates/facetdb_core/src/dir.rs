//! On-disk layout of a database.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # fs2 advisory lock, one process at a time
//! └─ journal.log       # commit journal
//! ```
//!
//! Only the journal holds data; `LOCK` is empty and exists to be locked.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// A database directory opened for exclusive use.
///
/// Dropping it closes the lock file, which releases the lock.
#[derive(Debug)]
pub struct DatabaseDir {
    root: PathBuf,
    _lock: File,
}

impl DatabaseDir {
    /// Name of the lock file.
    pub const LOCK_FILE: &'static str = "LOCK";
    /// Name of the journal file.
    pub const JOURNAL_FILE: &'static str = "journal.log";

    /// Where the journal of the database rooted at `root` lives.
    ///
    /// Read-only tools use this to look at a journal without taking the lock.
    #[must_use]
    pub fn journal_path_in(root: &Path) -> PathBuf {
        root.join(Self::JOURNAL_FILE)
    }

    /// Locks the directory at `root`, creating it first if allowed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidOperation`] if `root` is missing and may not be
    ///   created, or is not a directory
    /// - [`CoreError::DatabaseLocked`] if another process holds the lock
    /// - [`CoreError::Io`] for file system failures
    pub fn open(root: &Path, create_if_missing: bool) -> CoreResult<Self> {
        match (root.is_dir(), root.exists()) {
            (true, _) => {}
            (false, true) => {
                return Err(CoreError::invalid_operation(format!(
                    "{} exists but is not a directory",
                    root.display()
                )))
            }
            (false, false) if create_if_missing => fs::create_dir_all(root)?,
            (false, false) => {
                return Err(CoreError::invalid_operation(format!(
                    "no database at {}",
                    root.display()
                )))
            }
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(Self::LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| CoreError::DatabaseLocked)?;

        tracing::debug!(path = %root.display(), "database directory locked");
        Ok(Self {
            root: root.to_path_buf(),
            _lock: lock,
        })
    }

    /// The directory itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The journal file inside this directory.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        Self::journal_path_in(&self.root)
    }
}
