//! Typed query builder.

use super::expr::Expr;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::schema::{from_document, Attributes, RESERVED_FIELDS};
use crate::session::Session;
use crate::transaction::{LockMode, LockTarget};
use facetdb_codec::Document;
use rand::Rng;
use std::marker::PhantomData;

/// A query over the collection of `T`, bound to a session.
///
/// Filters are conjunctive: `filter(a).filter(b)` selects the same documents
/// as `filter(a.and(b))`. Queries scan the collection; there are no indexes.
pub struct Query<'s, T, S> {
    session: &'s S,
    filters: Vec<Expr>,
    _entity: PhantomData<fn() -> T>,
}

impl<'s, T: Entity, S: Session> Query<'s, T, S> {
    /// Starts an unfiltered query.
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            filters: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    /// Adds several filters.
    #[must_use]
    pub fn filters(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.filters.extend(exprs);
        self
    }

    /// The conjunction of every filter added so far.
    #[must_use]
    pub fn predicate(&self) -> Expr {
        Expr::all(self.filters.iter().cloned())
    }

    fn matching(&self) -> CoreResult<Vec<Document>> {
        scan_matching(self.session, T::COLLECTION, &self.predicate())
    }

    /// All matching entities, in no particular order.
    ///
    /// # Errors
    ///
    /// Fails if storage is unreachable or a document does not fit the schema.
    pub fn get(&self) -> CoreResult<Vec<T>> {
        self.matching()?.iter().map(from_document).collect()
    }

    /// One matching entity, picked at random among all matches.
    ///
    /// # Errors
    ///
    /// Fails if storage is unreachable or the document does not fit the schema.
    pub fn first(&self) -> CoreResult<Option<T>> {
        pick_random(self.matching()?)
            .map(|doc| from_document(&doc))
            .transpose()
    }

    /// Number of matches.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`](crate::CoreError::StorageUnavailable) if storage is unreachable.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.matching()?.len())
    }

    /// Whether anything matches.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`](crate::CoreError::StorageUnavailable) if storage is unreachable.
    pub fn exists(&self) -> CoreResult<bool> {
        Ok(self.count()? > 0)
    }

    /// Returns a match, or creates, saves and returns a new entity.
    ///
    /// The new entity starts from `T::default()`, takes every `field == literal`
    /// conjunct of the filter (an `id` conjunct presets its id), and is then
    /// passed to `init`.
    ///
    /// Inside a transaction an exclusive lock on the filter is taken first,
    /// so two transactions running the same call cannot both create. Outside
    /// a transaction concurrent callers may create duplicates.
    ///
    /// # Errors
    ///
    /// Fails if the lookup, the lock or the save fails.
    pub fn first_or_create(&self, init: impl FnOnce(&mut T)) -> CoreResult<T> {
        let predicate = self.predicate();
        lock_predicate(self.session, T::COLLECTION, &predicate)?;

        if let Some(found) = self.first()? {
            return Ok(found);
        }

        let mut entity = T::default();
        let assignments = predicate.implied_assignments();
        if assignments
            .keys()
            .any(|path| !RESERVED_FIELDS.contains(&path.as_str()))
        {
            let mut attributes = entity.to_attributes();
            for (path, value) in &assignments {
                if !RESERVED_FIELDS.contains(&path.as_str()) {
                    attributes.set_path(path, value.clone());
                }
            }
            let normalized = T::schema().normalize(attributes.as_map(), "")?;
            entity.apply_attributes(&Attributes::from(normalized))?;
        }
        if let Some(id) = predicate.implied_id() {
            entity.meta_mut().preset_id(id);
        }

        init(&mut entity);
        self.session.save(&mut entity)?;
        Ok(entity)
    }
}

/// Inside a transaction, takes an exclusive lock on `predicate` over
/// `collection` so concurrent creators of the same match serialize.
pub(crate) fn lock_predicate<S: Session>(
    session: &S,
    collection: &str,
    predicate: &Expr,
) -> CoreResult<()> {
    if !session.in_transaction() {
        return Ok(());
    }
    let target = LockTarget::Predicate {
        collection: collection.to_string(),
        fingerprint: predicate.fingerprint()?,
    };
    session.acquire(&target, LockMode::Exclusive)
}

pub(crate) fn scan_matching<S: Session>(
    session: &S,
    collection: &str,
    predicate: &Expr,
) -> CoreResult<Vec<Document>> {
    session.database().stats_recorder().record_query();
    let mut docs = session.scan(collection)?;
    docs.retain(|doc| predicate.matches(doc));
    Ok(docs)
}

pub(crate) fn pick_random(mut docs: Vec<Document>) -> Option<Document> {
    if docs.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..docs.len());
    Some(docs.swap_remove(index))
}

impl<T, S> Clone for Query<'_, T, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            filters: self.filters.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, S> std::fmt::Debug for Query<'_, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("collection", &T::COLLECTION)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::field;
    use crate::test_support::Hero;
    use crate::Database;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (name, coins) in [("John", 200), ("Jane", 50), ("John", 10)] {
            db.save(&mut Hero::named(name, coins)).unwrap();
        }
        db
    }

    #[test]
    fn get_applies_every_filter() {
        let db = seeded();
        let johns = db.query::<Hero>().filter(field("name").equals("John")).get().unwrap();
        assert_eq!(johns.len(), 2);

        let rich = db
            .query::<Hero>()
            .filter(field("name").equals("John"))
            .filter(field("coins").greater_than(100))
            .get()
            .unwrap();
        assert_eq!(rich.len(), 1);
        assert_eq!(rich[0].coins, 200);
    }

    #[test]
    fn chained_filters_equal_conjunction() {
        let db = seeded();
        let chained = db
            .query::<Hero>()
            .filter(field("name").equals("John"))
            .filter(field("coins").at_least(10));
        let combined = db
            .query::<Hero>()
            .filter(field("name").equals("John").and(field("coins").at_least(10)));
        assert_eq!(chained.predicate(), combined.predicate());
        assert_eq!(chained.count().unwrap(), combined.count().unwrap());
    }

    #[test]
    fn first_returns_none_without_matches() {
        let db = seeded();
        let nobody = db.query::<Hero>().filter(field("name").equals("Zed")).first().unwrap();
        assert!(nobody.is_none());
        assert!(!db.query::<Hero>().filter(field("coins").less_than(0)).exists().unwrap());
    }

    #[test]
    fn first_picks_a_match() {
        let db = seeded();
        for _ in 0..10 {
            let hero = db
                .query::<Hero>()
                .filter(field("name").equals("John"))
                .first()
                .unwrap()
                .unwrap();
            assert_eq!(hero.name, "John");
        }
    }

    #[test]
    fn first_or_create_applies_filter_and_initializer() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .query::<Hero>()
            .filter(field("name").equals("Ann"))
            .first_or_create(|hero| hero.coins = 7)
            .unwrap();
        assert_eq!(created.name, "Ann");
        assert_eq!(created.coins, 7);
        assert!(created.id().is_some());

        let again = db
            .query::<Hero>()
            .filter(field("name").equals("Ann"))
            .first_or_create(|hero| hero.coins = 99)
            .unwrap();
        assert_eq!(again.id(), created.id());
        assert_eq!(again.coins, 7);
    }

    #[test]
    fn first_or_create_presets_filtered_id() {
        let db = Database::open_in_memory().unwrap();
        let hero = db
            .query::<Hero>()
            .filter(field("id").equals("hero-7"))
            .first_or_create(|_| {})
            .unwrap();
        assert_eq!(hero.id().map(|id| id.as_str()), Some("hero-7"));
        assert!(db.find::<Hero>("hero-7").unwrap().is_some());
    }

    #[test]
    fn queries_can_filter_on_metadata() {
        let db = seeded();
        let any = db.query::<Hero>().first().unwrap().unwrap();
        let id = any.id().unwrap().as_str().to_string();
        let by_id = db.query::<Hero>().filter(field("id").equals(id.as_str())).get().unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id(), any.id());
    }
}
