//! Database statistics
//!
//! Read-only reports. Writers emit one JSON object per line.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::codec::json::{HashJson, SourceJson};
use crate::codec::to_hex;
use crate::engine::{HashDb, HashEntry};
use crate::error::Result;

/// Write one [`SourceJson`] line per source; returns the number written
pub fn sources<W: Write>(db: &HashDb, out: &mut W) -> Result<u64> {
    let mut written = 0;
    for file_hash in db.source_hashes() {
        if let Some(source) = db.find_source(&file_hash) {
            serde_json::to_writer(&mut *out, &SourceJson::from_entry(&source))?;
            writeln!(out)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Distribution of occurrence counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Histogram {
    pub total_hashes: u64,
    pub total_distinct_hashes: u64,
    /// Occurrence count → number of distinct hashes with that count
    pub buckets: BTreeMap<u64, u64>,
}

#[derive(Serialize)]
struct HistogramLine {
    duplicates: u64,
    distinct_hashes: u64,
    total: u64,
}

impl Histogram {
    /// Header line then one line per bucket
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(
            out,
            "{{\"total_hashes\":{},\"total_distinct_hashes\":{}}}",
            self.total_hashes, self.total_distinct_hashes
        )?;
        for (&duplicates, &distinct_hashes) in &self.buckets {
            let line = HistogramLine {
                duplicates,
                distinct_hashes,
                total: duplicates * distinct_hashes,
            };
            serde_json::to_writer(&mut *out, &line)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

pub fn histogram(db: &HashDb) -> Histogram {
    let mut histogram = Histogram::default();
    for entry in db.hash_entries() {
        histogram.total_hashes += entry.count;
        histogram.total_distinct_hashes += 1;
        *histogram.buckets.entry(entry.count).or_default() += 1;
    }
    histogram
}

/// Hashes that occur exactly `count` times
pub fn duplicates(db: &HashDb, count: u64) -> Vec<HashEntry> {
    db.hash_entries()
        .into_iter()
        .filter(|e| e.count == count)
        .collect()
}

/// One hash of a source, as listed by [`hash_table`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashTableRow {
    pub block_hash: String,
    pub k_entropy: u64,
    pub block_label: String,
    /// Occurrences within the source
    pub count: u64,
    pub file_offsets: Vec<u64>,
}

/// Hashes that occur in the source `file_hash`, in digest order
pub fn hash_table(db: &HashDb, file_hash: &[u8]) -> Vec<HashTableRow> {
    db.hash_entries()
        .into_iter()
        .filter_map(|entry| {
            let occurrences = entry.source(file_hash)?;
            Some(HashTableRow {
                block_hash: to_hex(&entry.block_hash),
                k_entropy: entry.k_entropy,
                block_label: entry.block_label.clone(),
                count: occurrences.count,
                file_offsets: occurrences.offsets.clone(),
            })
        })
        .collect()
}

/// Write `entries` as hash JSON lines
pub fn write_entries<W: Write>(entries: &[HashEntry], out: &mut W) -> Result<()> {
    for entry in entries {
        serde_json::to_writer(&mut *out, &HashJson::from_entry(entry))?;
        writeln!(out)?;
    }
    Ok(())
}
