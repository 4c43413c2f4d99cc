//! Error types for FacetDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in FacetDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An insert named an id that is already stored in the collection.
    #[error("identity conflict: `{id}` already exists in `{collection}`")]
    IdentityConflict {
        /// Collection of the conflicting document.
        collection: String,
        /// The duplicate id.
        id: String,
    },

    /// The backing store cannot be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] facetdb_storage::StorageError),

    /// The document backing an instance no longer exists.
    #[error("not found: `{id}` in `{collection}`")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// The missing id.
        id: String,
    },

    /// A lock was requested outside of any transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Waiting for a lock would have closed a wait-for cycle.
    ///
    /// The requesting transaction has already been rolled back.
    #[error("deadlock detected: {txid} aborted while waiting for {target}")]
    DeadlockDetected {
        /// The aborted transaction.
        txid: String,
        /// The lock it was waiting for.
        target: String,
    },

    /// A written document changed after this transaction read it.
    #[error("write conflict on `{id}` in `{collection}`")]
    WriteConflict {
        /// Collection of the document.
        collection: String,
        /// Id of the document.
        id: String,
    },

    /// A lock could not be granted within the configured wait.
    #[error("lock timeout: {txid} waited {waited_ms} ms for {target}")]
    LockTimeout {
        /// The waiting transaction.
        txid: String,
        /// The requested lock.
        target: String,
        /// How long the wait lasted.
        waited_ms: u64,
    },

    /// A value does not fit the declared schema.
    #[error("schema violation at `{path}`: {message}")]
    SchemaViolation {
        /// Dotted path of the offending attribute.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// A collection was registered twice with different schemas.
    #[error("schema conflict: `{collection}` is already registered with a different schema")]
    SchemaConflict {
        /// The collection name.
        collection: String,
    },

    /// A value could not be converted to the requested Rust type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type.
        expected: &'static str,
        /// Type actually found.
        found: &'static str,
    },

    /// No schema is registered under this entity type name.
    #[error("unknown entity type: `{name}`")]
    UnknownEntityType {
        /// The requested name.
        name: String,
    },

    /// The instance must be refreshed before it can be saved again.
    #[error("stale entity: `{id}` in `{collection}` must be refreshed")]
    StaleEntity {
        /// Collection of the instance.
        collection: String,
        /// Id of the instance, if it has one.
        id: String,
    },

    /// The transaction is no longer usable.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] facetdb_codec::CodecError),

    /// The journal is damaged.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Another process holds the database directory.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Returns whether `run_in_transaction` may re-run the work after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeadlockDetected { .. } | Self::WriteConflict { .. }
        )
    }

    /// Creates a schema violation error.
    pub fn schema_violation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let deadlock = CoreError::DeadlockDetected {
            txid: "txn:1".into(),
            target: "doc:players/a".into(),
        };
        let conflict = CoreError::WriteConflict {
            collection: "players".into(),
            id: "a".into(),
        };
        let timeout = CoreError::LockTimeout {
            txid: "txn:1".into(),
            target: "doc:players/a".into(),
            waited_ms: 10,
        };

        assert!(deadlock.is_retryable());
        assert!(conflict.is_retryable());
        assert!(!timeout.is_retryable());
        assert!(!CoreError::NoActiveTransaction.is_retryable());
    }

    #[test]
    fn storage_errors_become_unavailable() {
        let err: CoreError = facetdb_storage::StorageError::unavailable("offline").into();
        assert!(matches!(err, CoreError::StorageUnavailable(_)));
        assert!(err.to_string().starts_with("storage unavailable"));
    }
}
