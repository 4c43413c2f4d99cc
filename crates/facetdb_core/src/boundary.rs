//! Plain-data entry point for remote facet calls.
//!
//! A [`Call`] names an entity type by its collection and carries documents
//! and filters as plain data, so it can arrive as JSON from a game client.
//! [`execute`] runs it against any [`Session`] using the schema registered
//! for that collection and answers with document snapshots.
//!
//! ```rust
//! use facetdb_core::boundary::{execute, Call, CallResult};
//! use facetdb_core::{Database, FieldKind, Schema};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.schemas()
//!     .register("players", Schema::new().field("name", FieldKind::Text))
//!     .unwrap();
//!
//! let call: Call = serde_json::from_str(
//!     r#"{"op": "create", "entity": "players", "attributes": {"name": "John"}}"#,
//! )
//! .unwrap();
//! let CallResult::Document { document } = execute(&db, &call).unwrap() else {
//!     panic!("expected a document");
//! };
//! assert!(document.contains("id"));
//! ```

use crate::entity::{EntityId, Lifecycle};
use crate::error::{CoreError, CoreResult};
use crate::query::{lock_predicate, pick_random, scan_matching, Expr};
use crate::schema::{document_meta, stamp_document, Schema};
use crate::session::Session;
use crate::types::DocumentKey;
use facetdb_codec::{Document, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a query call returns its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Every match.
    #[default]
    All,
    /// One random match, or nothing.
    First,
    /// One match, created from the filter and `initial` if there is none.
    FirstOrCreate,
}

/// One remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    /// Insert a new entity from its attributes. An `id` attribute presets the id.
    Create {
        /// Entity type (collection) name.
        entity: String,
        /// Attribute values.
        attributes: Document,
    },
    /// Save a snapshot previously returned by another call.
    ///
    /// A snapshot with id and timestamps overwrites the stored document;
    /// anything else is inserted like [`Call::Create`].
    Save {
        /// Entity type (collection) name.
        entity: String,
        /// The snapshot.
        document: Document,
    },
    /// Delete by id.
    Delete {
        /// Entity type (collection) name.
        entity: String,
        /// Id to delete.
        id: String,
    },
    /// Reload by id; fails if the document is gone.
    Refresh {
        /// Entity type (collection) name.
        entity: String,
        /// Id to reload.
        id: String,
    },
    /// Look up by id.
    Find {
        /// Entity type (collection) name.
        entity: String,
        /// Id to look up.
        id: String,
    },
    /// Filtered lookup.
    Query {
        /// Entity type (collection) name.
        entity: String,
        /// Conjunctive filters.
        #[serde(default)]
        filters: Vec<Expr>,
        /// Result shape.
        #[serde(default)]
        mode: QueryMode,
        /// Extra attributes for a created entity in `first_or_create` mode.
        #[serde(default)]
        initial: Option<Document>,
    },
    /// Run calls atomically, retrying on deadlock or write conflict.
    Transaction {
        /// The calls, in order.
        calls: Vec<Call>,
        /// Retry budget; the configured default when absent.
        #[serde(default)]
        max_retries: Option<u32>,
    },
}

/// Answer to a [`Call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallResult {
    /// Snapshot of the created, saved or refreshed entity.
    Document {
        /// The stored document.
        document: Document,
    },
    /// Result of a lookup.
    Found {
        /// The document, if any.
        document: Option<Document>,
    },
    /// Result of a delete.
    Deleted {
        /// Whether a stored document was removed.
        removed: bool,
    },
    /// Result of a query in `all` mode.
    Documents {
        /// Matching documents, in no particular order.
        documents: Vec<Document>,
    },
    /// Results of a transaction, one per call.
    Batch {
        /// Per-call results.
        results: Vec<CallResult>,
    },
}

/// Runs `call` against `session`.
///
/// # Errors
///
/// [`CoreError::UnknownEntityType`] if no schema is registered under the
/// entity name, otherwise whatever the operation fails with.
pub fn execute<S: Session>(session: &S, call: &Call) -> CoreResult<CallResult> {
    match call {
        Call::Create { entity, attributes } => {
            let schema = schema_for(session, entity)?;
            let preset = preset_id(attributes)?;
            insert(session, entity, &schema, attributes, preset)
                .map(|document| CallResult::Document { document })
        }
        Call::Save { entity, document } => {
            let schema = schema_for(session, entity)?;
            save(session, entity, &schema, document).map(|document| CallResult::Document { document })
        }
        Call::Delete { entity, id } => {
            schema_for(session, entity)?;
            let removed = session.remove_document(&key(entity, id))?;
            if removed {
                session.database().stats_recorder().record_delete();
            }
            Ok(CallResult::Deleted { removed })
        }
        Call::Refresh { entity, id } => {
            schema_for(session, entity)?;
            let document = session
                .load(&key(entity, id))?
                .ok_or_else(|| CoreError::not_found(entity.as_str(), id.as_str()))?;
            session.database().stats_recorder().record_refresh();
            Ok(CallResult::Document { document })
        }
        Call::Find { entity, id } => {
            schema_for(session, entity)?;
            let document = session.load(&key(entity, id))?;
            Ok(CallResult::Found { document })
        }
        Call::Query {
            entity,
            filters,
            mode,
            initial,
        } => {
            let schema = schema_for(session, entity)?;
            query(session, entity, &schema, filters, *mode, initial.as_ref())
        }
        Call::Transaction { calls, max_retries } => {
            let retries =
                max_retries.unwrap_or(session.database().config().default_max_retries);
            let results = session.run_in_transaction(retries, |txn| {
                calls.iter().map(|call| execute(txn, call)).collect()
            })?;
            Ok(CallResult::Batch { results })
        }
    }
}

fn schema_for<S: Session>(session: &S, entity: &str) -> CoreResult<Arc<Schema>> {
    session
        .database()
        .schemas()
        .get(entity)
        .ok_or_else(|| CoreError::UnknownEntityType {
            name: entity.to_string(),
        })
}

fn key(entity: &str, id: &str) -> DocumentKey {
    DocumentKey::new(entity, EntityId::from(id))
}

fn preset_id(attributes: &Document) -> CoreResult<Option<EntityId>> {
    match attributes.get(crate::schema::ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(id)) => Ok(Some(EntityId::from(id.as_str()))),
        Some(other) => Err(CoreError::TypeMismatch {
            expected: "text",
            found: other.type_name(),
        }),
    }
}

fn insert<S: Session>(
    session: &S,
    entity: &str,
    schema: &Schema,
    attributes: &Document,
    preset: Option<EntityId>,
) -> CoreResult<Document> {
    let db = session.database();
    let mut document = Document::from(schema.normalize(attributes.as_map(), "")?);
    let id = preset.unwrap_or_else(EntityId::generate);
    let now = db.clock().now();
    stamp_document(&mut document, &id, now, now);
    session.insert_document(DocumentKey::new(entity, id), document.clone())?;
    db.stats_recorder().record_save(true);
    Ok(document)
}

fn save<S: Session>(
    session: &S,
    entity: &str,
    schema: &Schema,
    snapshot: &Document,
) -> CoreResult<Document> {
    let meta = document_meta(snapshot)?;
    let (Lifecycle::Persisted, Some(id), Some(created_at)) =
        (meta.lifecycle(), meta.id(), meta.created_at())
    else {
        return insert(session, entity, schema, snapshot, meta.id().cloned());
    };

    let db = session.database();
    let mut document = Document::from(schema.normalize(snapshot.as_map(), "")?);
    if let Some(updated_at) = meta.updated_at() {
        db.clock().observe(updated_at);
    }
    let now = db.clock().now();
    stamp_document(&mut document, id, created_at, now);
    session.replace_document(DocumentKey::new(entity, id.clone()), document.clone())?;
    db.stats_recorder().record_save(false);
    Ok(document)
}

fn query<S: Session>(
    session: &S,
    entity: &str,
    schema: &Schema,
    filters: &[Expr],
    mode: QueryMode,
    initial: Option<&Document>,
) -> CoreResult<CallResult> {
    let predicate = Expr::all(filters.iter().cloned());

    if mode == QueryMode::FirstOrCreate {
        lock_predicate(session, entity, &predicate)?;
    }
    let matches = scan_matching(session, entity, &predicate)?;

    match mode {
        QueryMode::All => Ok(CallResult::Documents { documents: matches }),
        QueryMode::First => Ok(CallResult::Found {
            document: pick_random(matches),
        }),
        QueryMode::FirstOrCreate => {
            if let Some(document) = pick_random(matches) {
                return Ok(CallResult::Document { document });
            }
            let mut attributes = crate::schema::Attributes::new();
            for (path, value) in predicate.implied_assignments() {
                attributes.set_path(&path, value);
            }
            if let Some(initial) = initial {
                for (name, value) in initial {
                    attributes.set_path(name, value.clone());
                }
            }
            let attributes = Document::from(attributes.into_map());
            let preset = preset_id(&attributes)?;
            let document = insert(session, entity, schema, &attributes, preset)?;
            Ok(CallResult::Document { document })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::field;
    use crate::schema::FieldKind;
    use crate::Database;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.schemas()
            .register(
                "players",
                Schema::new()
                    .field("name", FieldKind::Text)
                    .field("coins", FieldKind::Integer),
            )
            .unwrap();
        db
    }

    fn create(db: &Database, name: &str, coins: i64) -> Document {
        let mut attributes = Document::new();
        attributes.insert("name", name);
        attributes.insert("coins", coins);
        match execute(
            db,
            &Call::Create {
                entity: "players".into(),
                attributes,
            },
        )
        .unwrap()
        {
            CallResult::Document { document } => document,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let db = db();
        let result = execute(
            &db,
            &Call::Find {
                entity: "dragons".into(),
                id: "x".into(),
            },
        );
        assert!(matches!(result, Err(CoreError::UnknownEntityType { .. })));
    }

    #[test]
    fn create_then_find() {
        let db = db();
        let created = create(&db, "John", 200);
        let id = created.get("id").and_then(Value::as_text).unwrap().to_string();
        assert_eq!(created.get("createdAt"), created.get("updatedAt"));

        let found = execute(
            &db,
            &Call::Find {
                entity: "players".into(),
                id,
            },
        )
        .unwrap();
        assert_eq!(
            found,
            CallResult::Found {
                document: Some(created)
            }
        );
    }

    #[test]
    fn save_snapshot_overwrites_and_keeps_created_at() {
        let db = db();
        let mut snapshot = create(&db, "John", 200);
        snapshot.insert("coins", 250);

        let CallResult::Document { document } = execute(
            &db,
            &Call::Save {
                entity: "players".into(),
                document: snapshot.clone(),
            },
        )
        .unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(document.get("coins"), Some(&Value::Integer(250)));
        assert_eq!(document.get("createdAt"), snapshot.get("createdAt"));
        assert_ne!(document.get("updatedAt"), snapshot.get("updatedAt"));
        assert_eq!(db.count("players"), 1);
    }

    #[test]
    fn delete_reports_removal() {
        let db = db();
        let created = create(&db, "John", 200);
        let id = created.get("id").and_then(Value::as_text).unwrap().to_string();
        let delete = Call::Delete {
            entity: "players".into(),
            id: id.clone(),
        };
        assert_eq!(execute(&db, &delete).unwrap(), CallResult::Deleted { removed: true });
        assert_eq!(execute(&db, &delete).unwrap(), CallResult::Deleted { removed: false });

        let refresh = execute(
            &db,
            &Call::Refresh {
                entity: "players".into(),
                id,
            },
        );
        assert!(matches!(refresh, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn query_modes() {
        let db = db();
        create(&db, "John", 200);
        create(&db, "Jane", 50);

        let all = execute(
            &db,
            &Call::Query {
                entity: "players".into(),
                filters: vec![field("coins").greater_than(10)],
                mode: QueryMode::All,
                initial: None,
            },
        )
        .unwrap();
        let CallResult::Documents { documents } = all else {
            panic!("expected documents");
        };
        assert_eq!(documents.len(), 2);

        let mut initial = Document::new();
        initial.insert("coins", 5);
        let created = execute(
            &db,
            &Call::Query {
                entity: "players".into(),
                filters: vec![field("name").equals("Ann")],
                mode: QueryMode::FirstOrCreate,
                initial: Some(initial),
            },
        )
        .unwrap();
        let CallResult::Document { document } = created else {
            panic!("expected a document");
        };
        assert_eq!(document.get("name"), Some(&Value::from("Ann")));
        assert_eq!(document.get("coins"), Some(&Value::Integer(5)));
        assert_eq!(db.count("players"), 3);
    }

    #[test]
    fn transaction_call_is_atomic() {
        let db = db();
        let mut good = Document::new();
        good.insert("name", "A");
        let mut bad = Document::new();
        bad.insert("name", "B");
        bad.insert("coins", "lots");

        let call = Call::Transaction {
            calls: vec![
                Call::Create {
                    entity: "players".into(),
                    attributes: good,
                },
                Call::Create {
                    entity: "players".into(),
                    attributes: bad,
                },
            ],
            max_retries: Some(0),
        };
        assert!(matches!(
            execute(&db, &call),
            Err(CoreError::SchemaViolation { .. })
        ));
        assert_eq!(db.count("players"), 0);
    }

    #[test]
    fn calls_parse_from_json() {
        let json = r#"{
            "op": "transaction",
            "calls": [
                {"op": "delete", "entity": "players", "id": "p1"},
                {"op": "query", "entity": "players",
                 "filters": [{"kind": "compare", "op": "eq",
                              "left": {"kind": "field", "path": "name"},
                              "right": {"kind": "literal", "value": "John"}}],
                 "mode": "first"}
            ]
        }"#;
        let call: Call = serde_json::from_str(json).unwrap();
        let Call::Transaction { calls, max_retries } = call else {
            panic!("expected a transaction");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(max_retries, None);
        assert!(matches!(
            &calls[1],
            Call::Query {
                mode: QueryMode::First,
                ..
            }
        ));
    }

    #[test]
    fn boundary_and_typed_first_or_create_share_the_predicate_lock() {
        use crate::test_support::Hero;
        use crate::Config;
        use facetdb_storage::InMemoryBackend;
        use std::time::Duration;

        let db = Database::open_with_backend(
            Config::default().lock_wait_timeout(Duration::from_millis(50)),
            Box::new(InMemoryBackend::new()),
        )
        .unwrap();
        db.register::<Hero>().unwrap();

        let typed = db.begin();
        typed
            .query::<Hero>()
            .filter(field("name").equals("Ann"))
            .first_or_create(|_| {})
            .unwrap();

        let remote = db.begin();
        let result = execute(
            &remote,
            &Call::Query {
                entity: "heroes".into(),
                filters: vec![field("name").equals("Ann")],
                mode: QueryMode::FirstOrCreate,
                initial: None,
            },
        );
        assert!(matches!(result, Err(CoreError::LockTimeout { .. })));

        typed.commit().unwrap();
        assert_eq!(db.count("heroes"), 1);
    }
}
