//! Change tally
//!
//! Every record handed to an importer, remover, or set-algebra builder ends
//! in exactly one outcome. Outcomes are counted here so a batch can report
//! per-reason totals instead of aborting on the first bad record.

use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Result of one hash insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The occurrence was already recorded; nothing changed
    DuplicateOccurrence,
    InvalidAlignment,
    /// Empty digest, or shorter than the configured truncation
    InvalidHashSize,
    ExceedsMaxDuplicates,
    /// A different full digest already owns the truncated key
    DuplicateElement,
}

/// Result of one hash removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    InvalidAlignment,
    InvalidHashSize,
    NoSuchHash,
    NoSuchElement,
}

/// Result of attaching metadata to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    Inserted,
    Same,
    /// First writer wins; the new values were not stored
    MetadataMismatch,
}

/// Aggregated per-reason counters for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    // -------------------------------------------------------------------------
    // Hash Insertion
    // -------------------------------------------------------------------------
    pub hashes_inserted: u64,
    pub hashes_not_inserted_invalid_byte_alignment: u64,
    pub hashes_not_inserted_invalid_hash_size: u64,
    pub hashes_not_inserted_exceeds_max_duplicates: u64,
    pub hashes_not_inserted_duplicate_element: u64,
    pub hashes_not_inserted_duplicate_occurrence: u64,
    pub hash_metadata_mismatch: u64,

    // -------------------------------------------------------------------------
    // Hash Removal
    // -------------------------------------------------------------------------
    pub hashes_removed: u64,
    pub hashes_not_removed_invalid_byte_alignment: u64,
    pub hashes_not_removed_invalid_hash_size: u64,
    pub hashes_not_removed_no_hash: u64,
    pub hashes_not_removed_no_element: u64,

    // -------------------------------------------------------------------------
    // Source Catalog
    // -------------------------------------------------------------------------
    pub source_ids_inserted: u64,
    pub source_ids_already_present: u64,
    pub source_data_inserted: u64,
    pub source_data_same: u64,
    pub source_data_mismatch: u64,
    pub source_names_inserted: u64,
    pub source_names_already_present: u64,

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------
    pub invalid_records: u64,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one insertion outcome
    pub fn record_insert(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.hashes_inserted += 1,
            InsertOutcome::DuplicateOccurrence => {
                self.hashes_not_inserted_duplicate_occurrence += 1
            }
            InsertOutcome::InvalidAlignment => {
                self.hashes_not_inserted_invalid_byte_alignment += 1
            }
            InsertOutcome::InvalidHashSize => self.hashes_not_inserted_invalid_hash_size += 1,
            InsertOutcome::ExceedsMaxDuplicates => {
                self.hashes_not_inserted_exceeds_max_duplicates += 1
            }
            InsertOutcome::DuplicateElement => self.hashes_not_inserted_duplicate_element += 1,
        }
    }

    /// Count one removal outcome
    pub fn record_remove(&mut self, outcome: RemoveOutcome) {
        match outcome {
            RemoveOutcome::Removed => self.hashes_removed += 1,
            RemoveOutcome::InvalidAlignment => self.hashes_not_removed_invalid_byte_alignment += 1,
            RemoveOutcome::InvalidHashSize => self.hashes_not_removed_invalid_hash_size += 1,
            RemoveOutcome::NoSuchHash => self.hashes_not_removed_no_hash += 1,
            RemoveOutcome::NoSuchElement => self.hashes_not_removed_no_element += 1,
        }
    }

    /// Count one source metadata outcome
    pub fn record_metadata(&mut self, outcome: MetadataOutcome) {
        match outcome {
            MetadataOutcome::Inserted => self.source_data_inserted += 1,
            MetadataOutcome::Same => self.source_data_same += 1,
            MetadataOutcome::MetadataMismatch => self.source_data_mismatch += 1,
        }
    }

    /// Name/value pairs in a fixed order
    pub fn fields(&self) -> [(&'static str, u64); 20] {
        [
            ("hashes_inserted", self.hashes_inserted),
            (
                "hashes_not_inserted_invalid_byte_alignment",
                self.hashes_not_inserted_invalid_byte_alignment,
            ),
            (
                "hashes_not_inserted_invalid_hash_size",
                self.hashes_not_inserted_invalid_hash_size,
            ),
            (
                "hashes_not_inserted_exceeds_max_duplicates",
                self.hashes_not_inserted_exceeds_max_duplicates,
            ),
            (
                "hashes_not_inserted_duplicate_element",
                self.hashes_not_inserted_duplicate_element,
            ),
            (
                "hashes_not_inserted_duplicate_occurrence",
                self.hashes_not_inserted_duplicate_occurrence,
            ),
            ("hash_metadata_mismatch", self.hash_metadata_mismatch),
            ("hashes_removed", self.hashes_removed),
            (
                "hashes_not_removed_invalid_byte_alignment",
                self.hashes_not_removed_invalid_byte_alignment,
            ),
            (
                "hashes_not_removed_invalid_hash_size",
                self.hashes_not_removed_invalid_hash_size,
            ),
            ("hashes_not_removed_no_hash", self.hashes_not_removed_no_hash),
            ("hashes_not_removed_no_element", self.hashes_not_removed_no_element),
            ("source_ids_inserted", self.source_ids_inserted),
            ("source_ids_already_present", self.source_ids_already_present),
            ("source_data_inserted", self.source_data_inserted),
            ("source_data_same", self.source_data_same),
            ("source_data_mismatch", self.source_data_mismatch),
            ("source_names_inserted", self.source_names_inserted),
            ("source_names_already_present", self.source_names_already_present),
            ("invalid_records", self.invalid_records),
        ]
    }

    /// True when nothing was counted
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| *v == 0)
    }
}

impl AddAssign<&Changes> for Changes {
    fn add_assign(&mut self, other: &Changes) {
        self.hashes_inserted += other.hashes_inserted;
        self.hashes_not_inserted_invalid_byte_alignment +=
            other.hashes_not_inserted_invalid_byte_alignment;
        self.hashes_not_inserted_invalid_hash_size += other.hashes_not_inserted_invalid_hash_size;
        self.hashes_not_inserted_exceeds_max_duplicates +=
            other.hashes_not_inserted_exceeds_max_duplicates;
        self.hashes_not_inserted_duplicate_element += other.hashes_not_inserted_duplicate_element;
        self.hashes_not_inserted_duplicate_occurrence +=
            other.hashes_not_inserted_duplicate_occurrence;
        self.hash_metadata_mismatch += other.hash_metadata_mismatch;
        self.hashes_removed += other.hashes_removed;
        self.hashes_not_removed_invalid_byte_alignment +=
            other.hashes_not_removed_invalid_byte_alignment;
        self.hashes_not_removed_invalid_hash_size += other.hashes_not_removed_invalid_hash_size;
        self.hashes_not_removed_no_hash += other.hashes_not_removed_no_hash;
        self.hashes_not_removed_no_element += other.hashes_not_removed_no_element;
        self.source_ids_inserted += other.source_ids_inserted;
        self.source_ids_already_present += other.source_ids_already_present;
        self.source_data_inserted += other.source_data_inserted;
        self.source_data_same += other.source_data_same;
        self.source_data_mismatch += other.source_data_mismatch;
        self.source_names_inserted += other.source_names_inserted;
        self.source_names_already_present += other.source_names_already_present;
        self.invalid_records += other.invalid_records;
    }
}

/// Indented summary of the non-zero counters
impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes.");
        }
        writeln!(f, "hashdb changes:")?;
        for (name, value) in self.fields() {
            if value > 0 {
                writeln!(f, "    {}: {}", name, value)?;
            }
        }
        Ok(())
    }
}
