//! Identifiers shared by the store, the journal and transactions.

use crate::entity::{Entity, EntityId};
use std::fmt;

/// Identity of one transaction attempt, including autocommit writes.
///
/// Allocated from a counter that recovery restarts above the highest id in
/// the journal, so ids never repeat within one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Position of a commit in the journal, starting at 1.
///
/// A stored document remembers the sequence of the commit that last wrote
/// it; that value is its revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence of an empty journal.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw sequence.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The sequence the following commit receives.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Where a document lives: its entity type's collection and its id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    /// Collection name.
    pub collection: String,
    /// Id within the collection.
    pub id: EntityId,
}

impl DocumentKey {
    /// Key of `id` in `collection`.
    pub fn new(collection: impl Into<String>, id: EntityId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }

    /// Key of `id` in the collection of `T`.
    pub fn of<T: Entity>(id: EntityId) -> Self {
        Self::new(T::COLLECTION, id)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Hero;

    #[test]
    fn sequences_start_at_zero_and_count_up() {
        let first = SequenceNumber::ZERO.next();
        assert_eq!(first, SequenceNumber::new(1));
        assert!(first > SequenceNumber::ZERO);
        assert_eq!(first.to_string(), "seq:1");
    }

    #[test]
    fn keys_name_collection_and_id() {
        let key = DocumentKey::of::<Hero>(EntityId::from("abc"));
        assert_eq!(key, DocumentKey::new("heroes", EntityId::from("abc")));
        assert_eq!(key.to_string(), "heroes/abc");
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
    }
}
