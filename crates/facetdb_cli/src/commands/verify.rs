//! Verify command implementation.

use super::read_journal;
use facetdb_core::journal::{recover, JournalReader};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of intact records.
    pub records_checked: usize,
    /// Number of committed batches.
    pub committed_batches: usize,
    /// Bytes past the last committed batch (an interrupted commit).
    pub uncommitted_tail: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {}", path.display());
    println!();

    let data = read_journal(path)?;
    let result = verify_journal(&data);
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

fn verify_journal(data: &[u8]) -> VerifyResult {
    let mut result = VerifyResult::default();

    for item in JournalReader::new(data) {
        match item {
            Ok(_) => result.records_checked += 1,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        }
    }

    match recover(data) {
        Ok(recovery) => {
            result.committed_batches = recovery.batches.len();
            result.uncommitted_tail = data.len() as u64 - recovery.valid_len;
        }
        Err(e) => result.errors.push(e.to_string()),
    }
    result
}

fn print_result(result: &VerifyResult) {
    println!("  Records checked:    {}", result.records_checked);
    println!("  Committed batches:  {}", result.committed_batches);
    if result.uncommitted_tail > 0 {
        println!(
            "  Uncommitted tail:   {} bytes (discarded on next open)",
            result.uncommitted_tail
        );
    }

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_core::journal::{Journal, JournalOp};
    use facetdb_core::{SequenceNumber, TransactionId};
    use facetdb_storage::InMemoryBackend;

    fn journal_with_batches(count: u64) -> Vec<u8> {
        let backend = InMemoryBackend::new();
        let (journal, _) = Journal::open(Box::new(backend.clone()), false).unwrap();
        for n in 1..=count {
            let op = JournalOp::Delete {
                collection: "players".into(),
                id: format!("p{n}"),
            };
            journal
                .append_batch(TransactionId::new(n), SequenceNumber::new(n), &[op])
                .unwrap();
        }
        journal.read_all().unwrap()
    }

    #[test]
    fn clean_journal_passes() {
        let data = journal_with_batches(2);
        let result = verify_journal(&data);
        assert!(result.is_ok());
        assert_eq!(result.committed_batches, 2);
        assert_eq!(result.records_checked, 6);
        assert_eq!(result.uncommitted_tail, 0);
    }

    #[test]
    fn torn_tail_is_reported_but_passes() {
        let mut data = journal_with_batches(2);
        data.truncate(data.len() - 3);
        let result = verify_journal(&data);
        assert!(result.is_ok());
        assert_eq!(result.committed_batches, 1);
        assert!(result.uncommitted_tail > 0);
    }

    #[test]
    fn flipped_byte_fails() {
        let mut data = journal_with_batches(1);
        data[14] ^= 0xFF;
        let result = verify_journal(&data);
        assert!(!result.is_ok());
    }
}
