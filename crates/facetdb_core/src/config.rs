//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Retry budget used by [`crate::Database::transaction`].
    pub default_max_retries: u32,

    /// Longest a transaction waits for a single lock.
    pub lock_wait_timeout: Duration,

    /// Encoded document size above which a save logs a warning.
    pub document_size_warning: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            default_max_retries: 1,
            lock_wait_timeout: Duration::from_secs(10),
            document_size_warning: 50 * 1024, // 50 KiB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the default retry budget.
    #[must_use]
    pub const fn default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Sets the lock wait timeout.
    #[must_use]
    pub const fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    /// Sets the document size warning threshold in bytes.
    #[must_use]
    pub const fn document_size_warning(mut self, bytes: usize) -> Self {
        self.document_size_warning = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.default_max_retries, 1);
        assert_eq!(config.lock_wait_timeout, Duration::from_secs(10));
        assert_eq!(config.document_size_warning, 51_200);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .default_max_retries(5)
            .lock_wait_timeout(Duration::from_millis(250));

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.lock_wait_timeout, Duration::from_millis(250));
    }
}
