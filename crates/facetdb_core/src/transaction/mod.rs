//! Transactions, locks and deadlock detection.

mod lock;
mod state;

pub use lock::{LockManager, LockMode, LockTarget};
pub use state::{Transaction, TransactionState};
