//! Plain-data remote calls against typed entities.

use facetdb_core::boundary::{execute, Call, CallResult};
use facetdb_core::{CoreError, Document, Entity, Session, Value};
use facetdb_testkit::{Player, TestDatabase};
use serde_json::json;

fn call(value: serde_json::Value) -> Call {
    serde_json::from_value(value).unwrap()
}

fn document(result: CallResult) -> Document {
    match result {
        CallResult::Document { document } => document,
        CallResult::Found {
            document: Some(document),
        } => document,
        other => panic!("expected a document, got {other:?}"),
    }
}

#[test]
fn remote_create_is_visible_to_typed_code() {
    let db = TestDatabase::memory();
    db.register::<Player>().unwrap();

    let created = document(
        execute(
            &*db,
            &call(json!({
                "op": "create",
                "entity": "players",
                "attributes": {"name": "John", "coins": 200, "stats": {"strength": 4}}
            })),
        )
        .unwrap(),
    );
    let id = created.get("id").and_then(Value::as_text).unwrap().to_string();

    let john: Player = db.find(id.as_str()).unwrap().unwrap();
    assert_eq!(john.coins, 200);
    assert_eq!(john.level, 1);
    assert_eq!(john.stats.strength, 4);
    assert_eq!(john.stats.accuracy, 1.0);
}

#[test]
fn typed_saves_are_visible_to_remote_calls() {
    let db = TestDatabase::memory();
    let mut john = Player::new("John", 200);
    db.save(&mut john).unwrap();
    let id = john.id().unwrap().as_str().to_string();

    let found = document(
        execute(
            &*db,
            &call(json!({"op": "find", "entity": "players", "id": id})),
        )
        .unwrap(),
    );
    assert_eq!(found.get("name"), Some(&Value::from("John")));
    assert_eq!(found.get_path("stats.accuracy"), Some(&Value::Float(1.0)));
}

#[test]
fn remote_save_round_trips_a_snapshot() {
    let db = TestDatabase::memory();
    let mut john = Player::new("John", 200);
    db.save(&mut john).unwrap();
    let id = john.id().unwrap().as_str().to_string();

    let mut snapshot = document(
        execute(
            &*db,
            &call(json!({"op": "refresh", "entity": "players", "id": id})),
        )
        .unwrap(),
    );
    snapshot.insert("coins", 250);
    let saved = document(
        execute(
            &*db,
            &Call::Save {
                entity: "players".into(),
                document: snapshot,
            },
        )
        .unwrap(),
    );
    assert_eq!(saved.get("coins"), Some(&Value::Integer(250)));

    db.refresh(&mut john).unwrap();
    assert_eq!(john.coins, 250);
}

#[test]
fn remote_schema_violations_are_rejected() {
    let db = TestDatabase::memory();
    db.register::<Player>().unwrap();
    let result = execute(
        &*db,
        &call(json!({
            "op": "create",
            "entity": "players",
            "attributes": {"name": "John", "coins": "lots"}
        })),
    );
    assert!(matches!(result, Err(CoreError::SchemaViolation { .. })));
    assert_eq!(db.count("players"), 0);
}

#[test]
fn remote_transaction_with_first_or_create() {
    let db = TestDatabase::memory();
    db.register::<Player>().unwrap();
    let batch = call(json!({
        "op": "transaction",
        "calls": [
            {"op": "query", "entity": "players", "mode": "first_or_create",
             "filters": [{"kind": "compare", "op": "eq",
                          "left": {"kind": "field", "path": "name"},
                          "right": {"kind": "literal", "value": "Boss"}}],
             "initial": {"coins": 1000}},
            {"op": "query", "entity": "players", "mode": "all"}
        ]
    }));

    for _ in 0..2 {
        let CallResult::Batch { results } = execute(&*db, &batch).unwrap() else {
            panic!("expected a batch");
        };
        let CallResult::Documents { documents } = &results[1] else {
            panic!("expected documents");
        };
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].get("coins"), Some(&Value::Integer(1000)));
    }
    assert_eq!(db.count("players"), 1);
}

#[test]
fn results_serialize_to_json() {
    let db = TestDatabase::memory();
    db.register::<Player>().unwrap();
    let result = execute(
        &*db,
        &call(json!({"op": "delete", "entity": "players", "id": "nobody"})),
    )
    .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json, json!({"result": "deleted", "removed": false}));
}
