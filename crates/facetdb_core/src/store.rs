//! Journaled document store.
//!
//! Holds the committed state of every collection in memory and appends each
//! commit to the [`Journal`] before applying it. Reads see committed data
//! only; buffered transaction writes live in the transaction until commit.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalOp};
use crate::schema::{parse_timestamp, UPDATED_AT_FIELD};
use crate::types::{DocumentKey, SequenceNumber, TransactionId};
use facetdb_codec::{decode_document, encode_document, Document};
use facetdb_storage::StorageBackend;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A write buffered until commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StagedWrite {
    /// Store a new document; fails if the id is taken.
    Insert(Document),
    /// Store a document, replacing any existing one.
    Put(Document),
    /// Remove the document if present.
    Delete,
}

/// A committed document and the sequence of the commit that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredDocument {
    pub document: Document,
    pub revision: SequenceNumber,
}

/// Outcome of a commit.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitReceipt {
    /// Sequence of the commit; `None` if nothing had to be written.
    pub sequence: Option<SequenceNumber>,
    /// Number of documents actually removed.
    pub removed: usize,
    /// Journal bytes appended.
    pub bytes: u64,
}

type Collection = HashMap<EntityId, StoredDocument>;

struct StoreState {
    collections: HashMap<String, Collection>,
    last_sequence: SequenceNumber,
}

/// What [`DocumentStore::open`] learned from the journal.
pub(crate) struct Recovered {
    pub store: DocumentStore,
    pub highest_txid: Option<TransactionId>,
    /// Latest `updatedAt` among the replayed documents.
    pub latest_update: Option<DateTime<Utc>>,
}

pub(crate) struct DocumentStore {
    journal: Journal,
    state: RwLock<StoreState>,
    size_warning: usize,
}

impl DocumentStore {
    /// Opens the store, replaying the committed batches of the journal.
    pub fn open(
        backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
        size_warning: usize,
    ) -> CoreResult<Recovered> {
        let (journal, recovery) = Journal::open(backend, sync_on_commit)?;

        let mut collections: HashMap<String, Collection> = HashMap::new();
        let mut latest_update: Option<DateTime<Utc>> = None;
        for batch in &recovery.batches {
            for op in &batch.ops {
                match op {
                    JournalOp::Put {
                        collection,
                        id,
                        document,
                    } => {
                        let document = decode_document(document)?;
                        let updated = document
                            .get(UPDATED_AT_FIELD)
                            .and_then(|value| value.as_text())
                            .and_then(parse_timestamp);
                        latest_update = latest_update.max(updated);
                        collections.entry(collection.clone()).or_default().insert(
                            EntityId::from(id.as_str()),
                            StoredDocument {
                                document,
                                revision: batch.sequence,
                            },
                        );
                    }
                    JournalOp::Delete { collection, id } => {
                        if let Some(docs) = collections.get_mut(collection) {
                            docs.remove(&EntityId::from(id.as_str()));
                        }
                    }
                }
            }
        }

        let last_sequence = recovery.last_sequence().unwrap_or(SequenceNumber::ZERO);
        tracing::debug!(
            batches = recovery.batches.len(),
            %last_sequence,
            "journal replayed"
        );

        Ok(Recovered {
            store: Self {
                journal,
                state: RwLock::new(StoreState {
                    collections,
                    last_sequence,
                }),
                size_warning,
            },
            highest_txid: recovery.highest_txid,
            latest_update,
        })
    }

    /// Fails with `StorageUnavailable` if the backing store cannot be reached.
    pub fn check_available(&self) -> CoreResult<()> {
        self.journal.check_available()
    }

    /// Point lookup of a committed document.
    pub fn get(&self, key: &DocumentKey) -> CoreResult<Option<StoredDocument>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .collections
            .get(&key.collection)
            .and_then(|docs| docs.get(&key.id))
            .cloned())
    }

    /// All committed documents of a collection, in no particular order.
    pub fn scan(&self, collection: &str) -> CoreResult<Vec<(EntityId, StoredDocument)>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Number of committed documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Names of collections holding at least one document, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Sequence of the last commit.
    pub fn last_sequence(&self) -> SequenceNumber {
        self.state.read().last_sequence
    }

    /// Journal size in bytes.
    pub fn journal_len(&self) -> u64 {
        self.journal.len()
    }

    /// Validates, journals and applies a set of writes atomically.
    ///
    /// `reads` holds the revision each key had when the transaction read it
    /// (`None` for absent). A written key whose revision moved since then
    /// fails the whole commit with [`CoreError::WriteConflict`].
    pub fn commit(
        &self,
        txid: TransactionId,
        writes: &[(DocumentKey, StagedWrite)],
        reads: &HashMap<DocumentKey, Option<SequenceNumber>>,
    ) -> CoreResult<CommitReceipt> {
        let mut state = self.state.write();

        let mut ops = Vec::with_capacity(writes.len());
        for (key, write) in writes {
            let current = state
                .collections
                .get(&key.collection)
                .and_then(|docs| docs.get(&key.id))
                .map(|doc| doc.revision);

            if let Some(seen) = reads.get(key) {
                if *seen != current {
                    return Err(CoreError::WriteConflict {
                        collection: key.collection.clone(),
                        id: key.id.to_string(),
                    });
                }
            }

            match write {
                StagedWrite::Insert(document) => {
                    if current.is_some() {
                        return Err(CoreError::IdentityConflict {
                            collection: key.collection.clone(),
                            id: key.id.to_string(),
                        });
                    }
                    ops.push(self.put_op(key, document)?);
                }
                StagedWrite::Put(document) => ops.push(self.put_op(key, document)?),
                StagedWrite::Delete => {
                    if current.is_some() {
                        ops.push(JournalOp::Delete {
                            collection: key.collection.clone(),
                            id: key.id.to_string(),
                        });
                    }
                }
            }
        }

        if ops.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let sequence = state.last_sequence.next();
        let bytes = self.journal.append_batch(txid, sequence, &ops)?;

        let mut removed = 0;
        for (key, write) in writes {
            let docs = state.collections.entry(key.collection.clone()).or_default();
            match write {
                StagedWrite::Insert(document) | StagedWrite::Put(document) => {
                    docs.insert(
                        key.id.clone(),
                        StoredDocument {
                            document: document.clone(),
                            revision: sequence,
                        },
                    );
                }
                StagedWrite::Delete => {
                    if docs.remove(&key.id).is_some() {
                        removed += 1;
                    }
                }
            }
        }
        state.last_sequence = sequence;

        tracing::debug!(%txid, %sequence, ops = ops.len(), bytes, "commit applied");
        Ok(CommitReceipt {
            sequence: Some(sequence),
            removed,
            bytes,
        })
    }

    fn put_op(&self, key: &DocumentKey, document: &Document) -> CoreResult<JournalOp> {
        let bytes = encode_document(document)?;
        if bytes.len() > self.size_warning {
            tracing::warn!(
                key = %key,
                size = bytes.len(),
                limit = self.size_warning,
                "document exceeds the recommended size"
            );
        }
        Ok(JournalOp::Put {
            collection: key.collection.clone(),
            id: key.id.to_string(),
            document: bytes,
        })
    }
}
