//! Inspect command implementation.

use super::existing_database;
use facetdb_core::Database;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Journal size in bytes, after recovery.
    pub journal_size: u64,
    /// Sequence of the last commit.
    pub committed_seq: u64,
    /// Total number of stored documents.
    pub document_count: usize,
    /// Per-collection document counts.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub document_count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open_with_config(path, existing_database())?;
    let result = inspect(&db, path);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(db: &Database, path: &Path) -> InspectResult {
    let collections: Vec<CollectionStats> = db
        .collections()
        .into_iter()
        .map(|name| CollectionStats {
            document_count: db.count(&name),
            name,
        })
        .collect();

    InspectResult {
        path: path.display().to_string(),
        journal_size: db.journal_size(),
        committed_seq: db.committed_seq().0,
        document_count: collections.iter().map(|c| c.document_count).sum(),
        collections,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!();
    println!("Journal size:    {}", format_bytes(result.journal_size));
    println!("Committed seq:   {}", result.committed_seq);
    println!("Documents:       {}", result.document_count);

    if !result.collections.is_empty() {
        println!();
        println!("{:<24} {:>10}", "Collection", "Documents");
        println!("{}", "-".repeat(35));
        for coll in &result.collections {
            println!("{:<24} {:>10}", coll.name, coll.document_count);
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
