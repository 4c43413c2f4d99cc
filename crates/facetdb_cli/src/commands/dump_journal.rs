//! Dump journal command implementation.

use super::read_journal;
use facetdb_core::journal::{JournalReader, JournalRecord};
use serde::Serialize;
use std::path::Path;

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct JournalRecordInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction ID.
    pub txid: u64,
    /// Collection name (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Document id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Commit sequence (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Encoded document size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_size: Option<usize>,
}

impl JournalRecordInfo {
    fn new(offset: u64, record: &JournalRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()).to_uppercase(),
            txid: record.txid().as_u64(),
            collection: None,
            id: None,
            sequence: None,
            document_size: None,
        };
        match record {
            JournalRecord::Begin { .. } => {}
            JournalRecord::Put {
                collection,
                id,
                document,
                ..
            } => {
                info.collection = Some(collection.clone());
                info.id = Some(id.clone());
                info.document_size = Some(document.len());
            }
            JournalRecord::Delete { collection, id, .. } => {
                info.collection = Some(collection.clone());
                info.id = Some(id.clone());
            }
            JournalRecord::Commit { sequence, .. } => {
                info.sequence = Some(sequence.as_u64());
            }
        }
        info
    }
}

/// Runs the dump-journal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_journal(path)?;
    let records = read_records(&data, start_offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn read_records(
    data: &[u8],
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<JournalRecordInfo>, Box<dyn std::error::Error>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    for item in JournalReader::new(data) {
        let (offset, record) = item?;
        if offset < start_offset {
            continue;
        }
        if records.len() >= max_records {
            break;
        }
        records.push(JournalRecordInfo::new(offset, &record));
    }

    Ok(records)
}

fn print_text_output(records: &[JournalRecordInfo]) {
    println!(
        "{:>10} {:>8} {:>8} {:<20} {:<38} {:>8}",
        "Offset", "Type", "TxID", "Collection", "Id", "Detail"
    );
    println!("{}", "-".repeat(97));

    for rec in records {
        let detail = match (rec.sequence, rec.document_size) {
            (Some(seq), _) => format!("seq {seq}"),
            (_, Some(size)) => format!("{size} B"),
            _ => String::new(),
        };
        println!(
            "{:>10} {:>8} {:>8} {:<20} {:<38} {:>8}",
            rec.offset,
            rec.record_type,
            rec.txid,
            rec.collection.as_deref().unwrap_or("-"),
            rec.id.as_deref().unwrap_or("-"),
            detail
        );
    }

    println!();
    println!("Total: {} records", records.len());
}
