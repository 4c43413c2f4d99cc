//! Export command implementation.

use super::existing_database;
use facetdb_core::{Database, Document, Session};
use std::path::Path;

/// Runs the export command.
pub fn run(path: &Path, collection: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open_with_config(path, existing_database())?;
    let documents = export(&db, collection)?;
    tracing::debug!(collection, count = documents.len(), "collection exported");
    println!("{}", facetdb_codec::to_json_pretty(&documents)?);
    Ok(())
}

/// Documents of `collection`, ordered by id.
fn export(db: &Database, collection: &str) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    let mut documents = db.scan(collection)?;
    documents.sort_by(|a, b| {
        let id = |doc: &Document| doc.get("id").and_then(|v| v.as_text()).map(str::to_owned);
        id(a).cmp(&id(b))
    });
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_core::boundary::{execute, Call};
    use facetdb_core::{FieldKind, Schema, Value};

    #[test]
    fn export_sorts_by_id() {
        let db = Database::open_in_memory().unwrap();
        db.schemas()
            .register("players", Schema::new().field("name", FieldKind::Text))
            .unwrap();
        for id in ["b", "a", "c"] {
            let mut attributes = Document::new();
            attributes.insert("id", id);
            attributes.insert("name", id.to_uppercase());
            execute(
                &db,
                &Call::Create {
                    entity: "players".into(),
                    attributes,
                },
            )
            .unwrap();
        }

        let documents = export(&db, "players").unwrap();
        let ids: Vec<_> = documents
            .iter()
            .filter_map(|doc| doc.get("id").and_then(Value::as_text))
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(export(&db, "dragons").unwrap().is_empty());
    }
}
