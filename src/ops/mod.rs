//! Database Operations
//!
//! Set algebra and statistics over whole databases.
//!
//! ## Responsibilities
//! - Build destinations through the same insert paths imports use, so
//!   every output obeys the capacity policy of its own settings
//! - Abort as a whole: a failed operation leaves no new destination
//!   behind and commits nothing into an existing one
//! - Append each operation to the destination's `log.txt`
//!
//! ## Destination Lifecycle
//! ```text
//! OUT missing:   create .OUT.building ──► fill ──► commit ──► rename to OUT
//! OUT present:   open OUT read-write  ──► fill ──► commit
//! ```

mod adder;
mod set;
mod stats;

pub use set::{
    add, add_count_range, add_multiple, add_range, add_repository, deduplicate, intersect,
    intersect_hash, subtract, subtract_hash, subtract_repository, unique,
};
pub use stats::{
    duplicates, hash_table, histogram, sources, write_entries, HashTableRow, Histogram,
};

use std::fs;
use std::path::{Path, PathBuf};

use crate::changes::Changes;
use crate::config::Settings;
use crate::engine::{HashDb, OpenMode};
use crate::error::{HashdbError, Result};
use crate::logger::{OperationLog, Timestamp, TimestampEvent};

// =============================================================================
// Ranges
// =============================================================================

/// Half-open range of source ordinals, `lo:hi` with either side optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalRange {
    pub lo: u64,
    pub hi: Option<u64>,
}

impl OrdinalRange {
    pub fn parse(text: &str) -> Result<Self> {
        let (lo, hi) = split_range(text)?;
        let range = Self {
            lo: lo.unwrap_or(0),
            hi,
        };
        if range.hi.is_some_and(|hi| hi < range.lo) {
            return Err(HashdbError::InvalidRange(text.to_string()));
        }
        Ok(range)
    }

    pub fn contains(&self, ordinal: u64) -> bool {
        ordinal >= self.lo && self.hi.map_or(true, |hi| ordinal < hi)
    }
}

/// Inclusive occurrence-count range `m:n`; `n == 0` or empty is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    pub min: u64,
    pub max: Option<u64>,
}

impl CountRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self {
            min,
            max: (max != 0).then_some(max),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let (min, max) = split_range(text)?;
        let range = Self::new(min.unwrap_or(0), max.unwrap_or(0));
        if range.max.is_some_and(|max| max < range.min) {
            return Err(HashdbError::InvalidRange(text.to_string()));
        }
        Ok(range)
    }

    pub fn contains(&self, count: u64) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

fn split_range(text: &str) -> Result<(Option<u64>, Option<u64>)> {
    let invalid = || HashdbError::InvalidRange(text.to_string());
    let (lo, hi) = text.split_once(':').ok_or_else(invalid)?;
    let side = |s: &str| -> Result<Option<u64>> {
        match s.trim() {
            "" => Ok(None),
            s => s.parse().map(Some).map_err(|_| invalid()),
        }
    };
    Ok((side(lo)?, side(hi)?))
}

// =============================================================================
// Destination
// =============================================================================

/// Output database of one operation
pub(crate) struct Destination {
    db: HashDb,
    target: PathBuf,
    /// Set while building a new database next to `target`
    building: Option<PathBuf>,
    timestamp: Timestamp,
    /// Stamped when the destination was opened
    begin: TimestampEvent,
}

impl Destination {
    /// Open `target` read-write, or start building it with `settings`
    pub(crate) fn open_or_create(target: &Path, settings: &Settings) -> Result<Self> {
        let mut timestamp = Timestamp::new();
        let begin = timestamp.stamp("begin");
        if target.exists() {
            let db = HashDb::open(target, OpenMode::ReadWrite)?;
            return Ok(Self {
                db,
                target: target.to_path_buf(),
                building: None,
                timestamp,
                begin,
            });
        }

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HashdbError::NotFound(target.to_path_buf()))?;
        let building = target.with_file_name(format!(".{}.building", name));
        if building.exists() {
            tracing::warn!(dir = %building.display(), "removing stale build directory");
            fs::remove_dir_all(&building)?;
        }
        HashDb::create(&building, settings)?;
        let db = HashDb::open(&building, OpenMode::ReadWrite)?;
        Ok(Self {
            db,
            target: target.to_path_buf(),
            building: Some(building),
            timestamp,
            begin,
        })
    }

    pub(crate) fn db(&self) -> &HashDb {
        &self.db
    }

    /// Persist the destination and log `command` with its timing and
    /// change tally
    pub(crate) fn commit(mut self, command: &str, changes: &Changes) -> Result<()> {
        self.db.commit()?;
        let operation = command.split_whitespace().next().unwrap_or("operation");
        let timestamp = std::mem::take(&mut self.timestamp);
        let mut log = OperationLog::with_timestamp(self.db.dir(), command, timestamp)?;
        self.begin.name = format!("begin {}", operation);
        log.add_event(&self.begin)?;
        log.add_timestamp(&format!("end {}", operation))?;
        log.add_changes(changes)?;
        log.close()?;

        if let Some(building) = self.building.take() {
            fs::rename(&building, &self.target)?;
            tracing::info!(dir = %self.target.display(), "created database");
        }
        Ok(())
    }
}

impl Drop for Destination {
    fn drop(&mut self) {
        if let Some(building) = self.building.take() {
            if let Err(e) = fs::remove_dir_all(&building) {
                tracing::warn!(dir = %building.display(), error = %e, "failed to remove build directory");
            }
        }
    }
}

/// Open an input database for reading
pub(crate) fn open_input(dir: &Path) -> Result<HashDb> {
    HashDb::open(dir, OpenMode::ReadOnly)
}
