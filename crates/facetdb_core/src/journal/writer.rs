//! Journal writer.

use super::reader::{recover, JournalOp, Recovery};
use super::record::JournalRecord;
use crate::error::CoreResult;
use crate::types::{SequenceNumber, TransactionId};
use facetdb_storage::StorageBackend;
use parking_lot::Mutex;

/// Append-only commit journal over a storage backend.
///
/// Each commit is written as one contiguous buffer. The journal remembers the
/// length of its committed prefix; anything beyond it (a torn or failed
/// append) is cut off before the next batch goes in.
pub struct Journal {
    inner: Mutex<JournalInner>,
    sync_on_commit: bool,
}

struct JournalInner {
    backend: Box<dyn StorageBackend>,
    committed_len: u64,
}

impl Journal {
    /// Opens a journal, returning it together with the recovered batches.
    ///
    /// A tail that does not belong to a committed batch is truncated.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be read or the journal is corrupt.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
    ) -> CoreResult<(Self, Recovery)> {
        let size = backend.size()?;
        let data = read_len(backend.as_ref(), size)?;
        let recovery = recover(&data)?;

        if recovery.valid_len < size {
            tracing::warn!(
                valid_len = recovery.valid_len,
                size,
                "discarding incomplete journal tail"
            );
            backend.truncate(recovery.valid_len)?;
        }

        let journal = Self {
            inner: Mutex::new(JournalInner {
                backend,
                committed_len: recovery.valid_len,
            }),
            sync_on_commit,
        };
        Ok((journal, recovery))
    }

    /// Appends one committed batch and returns the number of bytes written.
    ///
    /// On failure nothing of the batch is left behind, or whatever is left
    /// is removed before the next append.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::StorageUnavailable`] if the backend fails.
    pub fn append_batch(
        &self,
        txid: TransactionId,
        sequence: SequenceNumber,
        ops: &[JournalOp],
    ) -> CoreResult<u64> {
        let mut buf = Vec::new();
        JournalRecord::Begin { txid }.encode_into(&mut buf)?;
        for op in ops {
            let record = match op {
                JournalOp::Put {
                    collection,
                    id,
                    document,
                } => JournalRecord::Put {
                    txid,
                    collection: collection.clone(),
                    id: id.clone(),
                    document: document.clone(),
                },
                JournalOp::Delete { collection, id } => JournalRecord::Delete {
                    txid,
                    collection: collection.clone(),
                    id: id.clone(),
                },
            };
            record.encode_into(&mut buf)?;
        }
        JournalRecord::Commit { txid, sequence }.encode_into(&mut buf)?;

        let mut inner = self.inner.lock();
        let start = inner.committed_len;
        if inner.backend.size()? != start {
            inner.backend.truncate(start)?;
        }

        if let Err(e) = write_durably(inner.backend.as_mut(), &buf, self.sync_on_commit) {
            if let Err(cleanup) = inner.backend.truncate(start) {
                tracing::warn!(%txid, error = %cleanup, "could not remove failed journal batch");
            }
            return Err(e.into());
        }

        inner.committed_len = start + buf.len() as u64;
        tracing::trace!(%txid, %sequence, bytes = buf.len(), "journal batch appended");
        Ok(buf.len() as u64)
    }

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::StorageUnavailable`] if it is not.
    pub fn check_available(&self) -> CoreResult<()> {
        self.inner.lock().backend.size()?;
        Ok(())
    }

    /// Returns the committed journal length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.lock().committed_len
    }

    /// Returns true if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the committed journal image.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be read.
    pub fn read_all(&self) -> CoreResult<Vec<u8>> {
        let inner = self.inner.lock();
        read_len(inner.backend.as_ref(), inner.committed_len)
    }
}

fn write_durably(
    backend: &mut dyn StorageBackend,
    buf: &[u8],
    sync: bool,
) -> facetdb_storage::StorageResult<()> {
    backend.append(buf)?;
    backend.flush()?;
    if sync {
        backend.sync()?;
    }
    Ok(())
}

fn read_len(backend: &dyn StorageBackend, len: u64) -> CoreResult<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let len = usize::try_from(len)
        .map_err(|_| crate::CoreError::invalid_operation("journal does not fit in memory"))?;
    Ok(backend.read_at(0, len)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use facetdb_storage::{FaultyBackend, InMemoryBackend};

    fn put(id: &str) -> JournalOp {
        JournalOp::Put {
            collection: "players".into(),
            id: id.into(),
            document: vec![0xA0],
        }
    }

    #[test]
    fn appended_batches_recover() {
        let backend = InMemoryBackend::new();
        let (journal, recovery) = Journal::open(Box::new(backend.clone()), false).unwrap();
        assert!(recovery.batches.is_empty());
        assert!(journal.is_empty());

        journal
            .append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put("a")])
            .unwrap();
        journal
            .append_batch(
                TransactionId::new(2),
                SequenceNumber::new(2),
                &[JournalOp::Delete {
                    collection: "players".into(),
                    id: "a".into(),
                }],
            )
            .unwrap();
        assert_eq!(journal.len(), backend.snapshot().len() as u64);

        let (_, recovery) = Journal::open(Box::new(backend), false).unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.last_sequence(), Some(SequenceNumber::new(2)));
    }

    #[test]
    fn open_truncates_torn_tail() {
        let backend = InMemoryBackend::new();
        {
            let (journal, _) = Journal::open(Box::new(backend.clone()), false).unwrap();
            journal
                .append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put("a")])
                .unwrap();
        }
        let valid = backend.snapshot().len();
        let mut raw = backend.clone();
        raw.append(b"FJNL\x01").unwrap();

        let (journal, recovery) = Journal::open(Box::new(backend.clone()), false).unwrap();
        assert_eq!(recovery.batches.len(), 1);
        assert_eq!(backend.snapshot().len(), valid);
        assert_eq!(journal.len(), valid as u64);
    }

    #[test]
    fn failed_append_leaves_nothing_behind() {
        let memory = InMemoryBackend::new();
        let faulty = FaultyBackend::new(memory.clone());
        let switch = faulty.switch();
        let (journal, _) = Journal::open(Box::new(faulty), false).unwrap();

        journal
            .append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put("a")])
            .unwrap();
        let committed = memory.snapshot().len();

        switch.tear_next_append(7);
        let result =
            journal.append_batch(TransactionId::new(2), SequenceNumber::new(2), &[put("b")]);
        assert!(matches!(result, Err(CoreError::StorageUnavailable(_))));
        assert_eq!(memory.snapshot().len(), committed);

        journal
            .append_batch(TransactionId::new(3), SequenceNumber::new(2), &[put("c")])
            .unwrap();
        let (_, recovery) = Journal::open(Box::new(memory), false).unwrap();
        assert_eq!(recovery.batches.len(), 2);
    }

    #[test]
    fn offline_backend_is_unavailable() {
        let faulty = FaultyBackend::new(InMemoryBackend::new());
        let switch = faulty.switch();
        let (journal, _) = Journal::open(Box::new(faulty), true).unwrap();

        switch.take_offline();
        assert!(journal.check_available().is_err());
        assert!(journal
            .append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put("a")])
            .is_err());

        switch.bring_online();
        journal.check_available().unwrap();
        journal
            .append_batch(TransactionId::new(1), SequenceNumber::new(1), &[put("a")])
            .unwrap();
    }
}
