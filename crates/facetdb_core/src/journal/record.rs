//! Journal record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FJNL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing CRC32.
pub const CRC_SIZE: usize = 4;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Opens a commit batch.
    Begin = 1,
    /// Stores a document.
    Put = 2,
    /// Removes a document.
    Delete = 3,
    /// Closes a commit batch.
    Commit = 4,
}

impl RecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One journal record.
///
/// A commit is always written as one contiguous batch:
/// `Begin`, any number of `Put` / `Delete`, then `Commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Opens a batch.
    Begin {
        /// Committing transaction.
        txid: TransactionId,
    },
    /// Stores a full document.
    Put {
        /// Committing transaction.
        txid: TransactionId,
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// CBOR-encoded document.
        document: Vec<u8>,
    },
    /// Removes a document.
    Delete {
        /// Committing transaction.
        txid: TransactionId,
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
    /// Closes a batch; everything before it in the batch becomes visible.
    Commit {
        /// Committing transaction.
        txid: TransactionId,
        /// Sequence assigned to the commit.
        sequence: SequenceNumber,
    },
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Begin { .. } => RecordType::Begin,
            Self::Put { .. } => RecordType::Put,
            Self::Delete { .. } => RecordType::Delete,
            Self::Commit { .. } => RecordType::Commit,
        }
    }

    /// Returns the transaction the record belongs to.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. } => *txid,
        }
    }

    /// Appends the full record, envelope and CRC included, to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if a field exceeds its length prefix.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> CoreResult<()> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("journal record payload too large"))?;

        let start = out.len();
        out.extend_from_slice(&JOURNAL_MAGIC);
        out.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        out.push(self.record_type().as_byte());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = compute_crc32(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a string or document does not fit its length prefix.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Begin { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::Put {
                txid,
                collection,
                id,
                document,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_bytes(&mut buf, collection.as_bytes())?;
                put_bytes(&mut buf, id.as_bytes())?;
                put_bytes(&mut buf, document)?;
            }
            Self::Delete {
                txid,
                collection,
                id,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_bytes(&mut buf, collection.as_bytes())?;
                put_bytes(&mut buf, id.as_bytes())?;
            }
            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalCorruption`] on short or over-long payloads.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor { payload, pos: 0 };
        let txid = TransactionId::new(cursor.u64()?);
        let record = match record_type {
            RecordType::Begin => Self::Begin { txid },
            RecordType::Put => Self::Put {
                txid,
                collection: cursor.string()?,
                id: cursor.string()?,
                document: cursor.bytes()?.to_vec(),
            },
            RecordType::Delete => Self::Delete {
                txid,
                collection: cursor.string()?,
                id: cursor.string()?,
            },
            RecordType::Commit => Self::Commit {
                txid,
                sequence: SequenceNumber::new(cursor.u64()?),
            },
        };
        if cursor.pos != payload.len() {
            return Err(CoreError::journal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                cursor.pos,
                payload.len()
            )));
        }
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_operation("journal field exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| CoreError::journal_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CoreError::journal_corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CoreResult<&'a [u8]> {
        let len: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CoreError::journal_corruption("invalid length"))?;
        self.take(u32::from_le_bytes(len) as usize)
    }

    fn string(&mut self) -> CoreResult<String> {
        String::from_utf8(self.bytes()?.to_vec())
            .map_err(|_| CoreError::journal_corruption("string is not UTF-8"))
    }
}

/// Computes CRC32 checksum for data (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
