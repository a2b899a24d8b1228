//! Scan Manager
//!
//! One scan session against one database. All modes share the same
//! resolution path (Bloom pre-check, then index lookup) and differ only in
//! how the result is assembled.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::codec::json::source_offsets;
use crate::codec::{parse_digest, to_hex, SourceJson, SourceOffsetList};
use crate::engine::{HashDb, HashEntry};
use crate::error::Result;

use super::ScanMode;

/// Full match report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedMatch {
    pub block_hash: String,
    pub k_entropy: u64,
    pub block_label: String,
    pub count: u64,
    pub source_list_id: u32,
    /// Source records; in optimized mode only those not reported before
    pub sources: Vec<SourceJson>,
    pub source_offsets: SourceOffsetList,
}

/// Outcome of scanning one digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScanResult {
    NotFound,
    Expanded(ExpandedMatch),
    /// Hash already reported in full earlier in the session
    Repeat { block_hash: String },
    Count { block_hash: String, count: u64 },
    ApproximateCount { block_hash: String, approximate_count: u64 },
}

impl ScanResult {
    pub fn is_found(&self) -> bool {
        !matches!(self, ScanResult::NotFound)
    }

    /// JSON text of a match, `None` for `NotFound`
    pub fn to_json(&self) -> Result<Option<String>> {
        match self {
            ScanResult::NotFound => Ok(None),
            found => Ok(Some(serde_json::to_string(found)?)),
        }
    }
}

/// What a session has already reported in full
#[derive(Default)]
struct ScanSession {
    hashes: HashSet<Vec<u8>>,
    sources: HashSet<Vec<u8>>,
    source_lists: HashSet<u32>,
}

/// A scan session over a shared database handle
pub struct ScanManager {
    db: Arc<HashDb>,
    session: Mutex<ScanSession>,
}

impl ScanManager {
    pub fn new(db: Arc<HashDb>) -> Self {
        Self {
            db,
            session: Mutex::new(ScanSession::default()),
        }
    }

    pub fn db(&self) -> &HashDb {
        &self.db
    }

    /// Forget what this session has reported
    pub fn clear(&self) {
        *self.session.lock() = ScanSession::default();
    }

    /// Scan a hex digest; invalid hex is an error for this query only
    pub fn scan_hex(&self, hex: &str, mode: ScanMode) -> Result<ScanResult> {
        let digest = parse_digest(hex)?;
        Ok(self.scan(&digest, mode))
    }

    /// Scan one block digest
    pub fn scan(&self, digest: &[u8], mode: ScanMode) -> ScanResult {
        if !self.db.maybe_present(digest) {
            return ScanResult::NotFound;
        }
        if mode == ScanMode::ApproximateCount {
            return match self.db.find_approximate_hash_count(digest) {
                0 => ScanResult::NotFound,
                approximate_count => ScanResult::ApproximateCount {
                    block_hash: to_hex(digest),
                    approximate_count,
                },
            };
        }

        let Some(entry) = self.db.find_hash(digest) else {
            return ScanResult::NotFound;
        };
        match mode {
            ScanMode::Count => ScanResult::Count {
                block_hash: to_hex(&entry.block_hash),
                count: entry.count,
            },
            ScanMode::Expanded => ScanResult::Expanded(self.expand(&entry, None)),
            _ => {
                let mut session = self.session.lock();
                if !session.hashes.insert(entry.block_hash.clone()) {
                    return ScanResult::Repeat {
                        block_hash: to_hex(&entry.block_hash),
                    };
                }
                ScanResult::Expanded(self.expand(&entry, Some(&mut *session)))
            }
        }
    }

    /// Build the full report; with a session, skip sources already sent
    fn expand(&self, entry: &HashEntry, session: Option<&mut ScanSession>) -> ExpandedMatch {
        let source_list_id = entry.source_list_id();
        let wanted: Vec<&[u8]> = match session {
            None => entry.sources.iter().map(|s| s.file_hash.as_slice()).collect(),
            Some(session) => {
                if session.source_lists.insert(source_list_id) {
                    entry
                        .sources
                        .iter()
                        .map(|s| s.file_hash.as_slice())
                        .filter(|h| session.sources.insert(h.to_vec()))
                        .collect()
                } else {
                    Vec::new()
                }
            }
        };
        let sources = wanted
            .into_iter()
            .filter_map(|h| self.db.find_source(h))
            .map(|s| SourceJson::from_entry(&s))
            .collect();

        ExpandedMatch {
            block_hash: to_hex(&entry.block_hash),
            k_entropy: entry.k_entropy,
            block_label: entry.block_label.clone(),
            count: entry.count,
            source_list_id,
            sources,
            source_offsets: source_offsets(entry),
        }
    }
}

// =============================================================================
// List Scanning
// =============================================================================

/// Totals of one `scan_list` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanListSummary {
    pub queries: u64,
    pub matches: u64,
    pub errors: u64,
}

/// Scan `<label>\t<hex digest>` lines.
///
/// Matches are written as `<label>\t<hex>\t<json>`; `#` lines are echoed.
/// A bad line produces an inline `# error: ...` line and the scan goes on.
pub fn scan_list<R: BufRead, W: Write>(
    manager: &ScanManager,
    reader: R,
    out: &mut W,
    mode: ScanMode,
) -> Result<ScanListSummary> {
    let mut summary = ScanListSummary::default();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            writeln!(out, "{}", line)?;
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        summary.queries += 1;

        let mut fields = line.split('\t');
        let (label, hex) = match (fields.next(), fields.next()) {
            (Some(label), Some(hex)) => (label, hex.trim()),
            _ => {
                summary.errors += 1;
                writeln!(out, "# error: expected label and block hash in '{}'", line)?;
                continue;
            }
        };
        match manager.scan_hex(hex, mode) {
            Ok(result) => {
                if let Some(json) = result.to_json()? {
                    summary.matches += 1;
                    writeln!(out, "{}\t{}\t{}", label, hex, json)?;
                }
            }
            Err(e) => {
                summary.errors += 1;
                writeln!(out, "# error: {}", e)?;
            }
        }
    }
    out.flush()?;
    Ok(summary)
}
