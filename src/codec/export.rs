//! JSON export
//!
//! Writes two `#` header lines, every hash record in ascending digest
//! order, then every source record in ascending file digest order. With a
//! [`HashRange`] only hashes inside it are written, followed by just the
//! sources those hashes reference, so disjoint ranges can be exported in
//! parallel and concatenated.

use std::collections::BTreeSet;
use std::io::Write;

use crate::engine::HashDb;
use crate::error::Result;

use super::json::{HashJson, SourceJson};
use super::HashRange;

/// Counts of what an export wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub hashes: u64,
    pub sources: u64,
}

/// Export `db` as line-delimited JSON
pub fn export_json<W: Write>(
    db: &HashDb,
    out: &mut W,
    range: Option<&HashRange>,
    command: &str,
) -> Result<ExportSummary> {
    writeln!(out, "# command: {}", command)?;
    writeln!(out, "# hashdb-Version: {}", crate::VERSION)?;

    let mut summary = ExportSummary::default();
    let mut referenced: BTreeSet<Vec<u8>> = BTreeSet::new();

    let mut cursor = match range.and_then(|r| r.lo.clone()) {
        Some(lo) => db.seek_hash(&lo),
        None => db.first_hash(),
    };
    while let Some(block_hash) = cursor {
        if let Some(range) = range {
            if range.is_past(&block_hash) {
                break;
            }
            if !range.contains(&block_hash) {
                cursor = db.next_hash(&block_hash);
                continue;
            }
        }
        if let Some(entry) = db.find_hash(&block_hash) {
            if range.is_some() {
                referenced.extend(entry.sources.iter().map(|s| s.file_hash.clone()));
            }
            serde_json::to_writer(&mut *out, &HashJson::from_entry(&entry))?;
            writeln!(out)?;
            summary.hashes += 1;
        }
        cursor = db.next_hash(&block_hash);
    }

    let sources = match range {
        Some(_) => referenced.into_iter().collect(),
        None => db.source_hashes(),
    };
    for file_hash in sources {
        if let Some(entry) = db.find_source(&file_hash) {
            serde_json::to_writer(&mut *out, &SourceJson::from_entry(&entry))?;
            writeln!(out)?;
            summary.sources += 1;
        }
    }

    out.flush()?;
    tracing::info!(hashes = summary.hashes, sources = summary.sources, "exported JSON");
    Ok(summary)
}
