//! Crash recovery testing for FacetDB.
//!
//! A crash can stop the journal at any byte. These helpers cut a journal
//! image at chosen offsets, reopen a database over each cut, and compare
//! what recovered against the commits that were complete before the cut.
//!
//! ## Usage
//!
//! ```rust
//! use facetdb_core::Session;
//! use facetdb_testkit::{check_every_cut, Player, TestDatabase};
//!
//! let test_db = TestDatabase::memory();
//! test_db.save(&mut Player::new("John", 200)).unwrap();
//! let image = test_db.journal_image().unwrap();
//! assert!(check_every_cut(&image).iter().all(|r| r.passed()));
//! ```

use facetdb_core::journal::{JournalReader, JournalRecord};
use facetdb_core::{Config, CoreResult, Database};
use facetdb_storage::InMemoryBackend;

/// Outcome of reopening one cut journal.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Journal length kept by the simulated crash.
    pub cut: usize,
    /// Commits complete within the cut.
    pub expected_seq: u64,
    /// Sequence the reopened database reports.
    pub recovered_seq: u64,
    /// Error from reopening, if any.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Whether recovery kept exactly the complete commits.
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.expected_seq == self.recovered_seq
    }
}

/// End offsets of every commit record in a journal image, in order.
///
/// # Errors
///
/// Fails if the image is damaged anywhere but its tail.
pub fn commit_boundaries(image: &[u8]) -> CoreResult<Vec<usize>> {
    let mut boundaries = Vec::new();
    let mut reader = JournalReader::new(image);
    while let Some(item) = reader.next() {
        let (_, record) = item?;
        if matches!(record, JournalRecord::Commit { .. }) {
            boundaries.push(usize::try_from(reader.offset()).unwrap_or(usize::MAX));
        }
    }
    Ok(boundaries)
}

/// Opens a database over a copy of `image`.
///
/// # Errors
///
/// Fails if recovery rejects the image.
pub fn reopen_image(image: Vec<u8>) -> CoreResult<Database> {
    let config = Config::default().sync_on_commit(false);
    Database::open_with_backend(config, Box::new(InMemoryBackend::with_data(image)))
}

/// Reopens the image cut at `cut` bytes.
pub fn check_cut(image: &[u8], boundaries: &[usize], cut: usize) -> CrashRecoveryResult {
    let expected_seq = boundaries.iter().filter(|&&end| end <= cut).count() as u64;
    match reopen_image(image[..cut].to_vec()) {
        Ok(db) => CrashRecoveryResult {
            cut,
            expected_seq,
            recovered_seq: db.committed_seq().as_u64(),
            error: None,
        },
        Err(e) => CrashRecoveryResult {
            cut,
            expected_seq,
            recovered_seq: 0,
            error: Some(e.to_string()),
        },
    }
}

/// Reopens the image cut at every byte offset, including the full image.
///
/// Assumes the image starts empty and sequences start at 1, as in a fresh
/// database.
pub fn check_every_cut(image: &[u8]) -> Vec<CrashRecoveryResult> {
    let boundaries = match commit_boundaries(image) {
        Ok(boundaries) => boundaries,
        Err(e) => {
            return vec![CrashRecoveryResult {
                cut: image.len(),
                expected_seq: 0,
                recovered_seq: 0,
                error: Some(e.to_string()),
            }]
        }
    };
    (0..=image.len())
        .map(|cut| check_cut(image, &boundaries, cut))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Player;
    use crate::fixtures::TestDatabase;
    use facetdb_core::Session;

    #[test]
    fn boundaries_match_commits() {
        let test_db = TestDatabase::memory();
        for n in 0..3 {
            test_db.save(&mut Player::new(&format!("p{n}"), n)).unwrap();
        }
        let image = test_db.journal_image().unwrap();
        let boundaries = commit_boundaries(&image).unwrap();
        assert_eq!(boundaries.len(), 3);
        assert_eq!(boundaries.last().copied(), Some(image.len()));
    }

    #[test]
    fn empty_image_recovers_nothing() {
        let results = check_every_cut(&[]);
        assert_eq!(results.len(), 1);
        assert!(results[0].passed());
    }
}
