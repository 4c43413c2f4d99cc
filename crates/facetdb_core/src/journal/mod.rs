//! Commit journal for durability and crash recovery.
//!
//! Every commit is appended as one contiguous batch before its writes become
//! visible to other sessions. On open the journal is replayed to rebuild the
//! document collections.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! A batch is `Begin`, then `Put` / `Delete` records, then `Commit`.
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end is a torn write and is treated
//!   as the end of the journal.
//! - A batch without its `Commit` record is discarded and cut off.
//! - Invalid magic, unknown versions or record types, and CRC mismatches
//!   abort the open with an error.

mod reader;
mod record;
mod writer;

pub use reader::{recover, CommittedBatch, JournalOp, JournalReader, Recovery};
pub use record::{compute_crc32, JournalRecord, RecordType, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use writer::Journal;
