//! Journal record iteration and recovery.

use super::record::{
    compute_crc32, JournalRecord, RecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};

/// Iterates over the records of a journal image.
///
/// Yields `(offset, record)` pairs. A truncated header or payload at the end
/// is treated as the end of the journal. Bad magic, an unknown version or
/// record type, and CRC mismatches are errors, after which the iterator is
/// exhausted.
pub struct JournalReader<'a> {
    data: &'a [u8],
    offset: usize,
    finished: bool,
}

impl<'a> JournalReader<'a> {
    /// Creates a reader over a full journal image.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            finished: false,
        }
    }

    /// Offset just past the last record yielded so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset as u64
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, JournalRecord)>> {
        let start = self.offset;
        let remaining = &self.data[start..];
        if remaining.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = &remaining[..HEADER_SIZE];
        if header[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }
        let type_byte = header[6];
        let record_type = RecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::journal_corruption(format!(
                "unknown record type {type_byte} at offset {start}"
            ))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining.len() < total {
            // torn tail: the crash happened before the write completed
            return Ok(None);
        }

        let body = &remaining[..HEADER_SIZE + payload_len];
        let crc_bytes = &remaining[HEADER_SIZE + payload_len..total];
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let record = JournalRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        self.offset = start + total;
        Ok(Some((start as u64, record)))
    }
}

impl Iterator for JournalReader<'_> {
    type Item = CoreResult<(u64, JournalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// One operation of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Store the CBOR document under `collection/id`.
    Put {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// CBOR-encoded document.
        document: Vec<u8>,
    },
    /// Remove `collection/id`.
    Delete {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
}

/// A batch that reached its commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// The committing transaction.
    pub txid: TransactionId,
    /// Sequence assigned to the commit.
    pub sequence: SequenceNumber,
    /// Operations in journal order.
    pub ops: Vec<JournalOp>,
}

/// Result of scanning a journal image.
#[derive(Debug, Clone, Default)]
pub struct Recovery {
    /// Committed batches in journal order.
    pub batches: Vec<CommittedBatch>,
    /// Length of the prefix made of complete, committed batches.
    pub valid_len: u64,
    /// Highest transaction id seen, committed or not.
    pub highest_txid: Option<TransactionId>,
}

impl Recovery {
    /// Sequence of the last committed batch.
    #[must_use]
    pub fn last_sequence(&self) -> Option<SequenceNumber> {
        self.batches.last().map(|batch| batch.sequence)
    }
}

/// Scans a journal image and keeps only committed batches.
///
/// A batch without its commit record at the end of the journal is discarded;
/// everything from its `Begin` onwards lies beyond [`Recovery::valid_len`].
///
/// # Errors
///
/// Returns [`CoreError::JournalCorruption`] or [`CoreError::ChecksumMismatch`]
/// for damage anywhere other than a torn tail.
pub fn recover(data: &[u8]) -> CoreResult<Recovery> {
    let mut recovery = Recovery::default();
    let mut open: Option<CommittedBatch> = None;
    let mut reader = JournalReader::new(data);

    while let Some(item) = reader.next() {
        let (offset, record) = item?;
        let txid = record.txid();
        recovery.highest_txid = recovery.highest_txid.max(Some(txid));

        match record {
            JournalRecord::Begin { txid } => {
                if open.is_some() {
                    return Err(CoreError::journal_corruption(format!(
                        "batch for {txid} at offset {offset} starts inside another batch"
                    )));
                }
                open = Some(CommittedBatch {
                    txid,
                    sequence: SequenceNumber::new(0),
                    ops: Vec::new(),
                });
            }
            JournalRecord::Put {
                collection,
                id,
                document,
                ..
            } => {
                open_batch(&mut open, txid, offset)?.ops.push(JournalOp::Put {
                    collection,
                    id,
                    document,
                });
            }
            JournalRecord::Delete { collection, id, .. } => {
                open_batch(&mut open, txid, offset)?
                    .ops
                    .push(JournalOp::Delete { collection, id });
            }
            JournalRecord::Commit { sequence, .. } => {
                open_batch(&mut open, txid, offset)?;
                let Some(mut batch) = open.take() else {
                    continue;
                };
                if let Some(last) = recovery.last_sequence() {
                    if sequence <= last {
                        return Err(CoreError::journal_corruption(format!(
                            "{sequence} at offset {offset} does not follow {last}"
                        )));
                    }
                }
                batch.sequence = sequence;
                recovery.batches.push(batch);
                recovery.valid_len = reader.offset();
            }
        }
    }

    Ok(recovery)
}

fn open_batch(
    open: &mut Option<CommittedBatch>,
    txid: TransactionId,
    offset: u64,
) -> CoreResult<&mut CommittedBatch> {
    match open {
        Some(batch) if batch.txid == txid => Ok(batch),
        _ => Err(CoreError::journal_corruption(format!(
            "record for {txid} at offset {offset} is outside its batch"
        ))),
    }
}
