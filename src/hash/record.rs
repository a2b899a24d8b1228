//! Hash records
//!
//! One record per stored block digest. Occurrences are grouped per source:
//! each group keeps the offsets it stored plus a count that may exceed them
//! once the group has been compacted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Occurrences of one hash within one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOccurrences {
    /// Total occurrences; always `>= offsets.len() + overflow.len()`
    pub count: u64,
    /// Offsets reported with the hash
    pub offsets: BTreeSet<u64>,
    /// Offsets inserted past `max_id_offset_pairs`: counted and kept for
    /// deduplication, but not reported
    pub overflow: BTreeSet<u64>,
}

impl SourceOccurrences {
    /// Occurrences counted without a reported offset
    pub fn compacted(&self) -> u64 {
        self.count - self.offsets.len() as u64
    }

    /// True when `offset` is already counted in this group
    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.contains(&offset) || self.overflow.contains(&offset)
    }
}

/// Optional classification carried with an insertion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashMeta {
    pub k_entropy: u64,
    pub block_label: String,
}

impl HashMeta {
    pub fn new(k_entropy: u64, block_label: impl Into<String>) -> Self {
        Self {
            k_entropy,
            block_label: block_label.into(),
        }
    }
}

/// Stored value for one block digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Full digest, kept even when the index key is truncated
    pub block_hash: Vec<u8>,
    pub k_entropy: u64,
    pub block_label: String,
    /// source_id → occurrences
    pub sources: BTreeMap<u64, SourceOccurrences>,
}

impl HashRecord {
    pub(crate) fn new(block_hash: &[u8]) -> Self {
        Self {
            block_hash: block_hash.to_vec(),
            k_entropy: 0,
            block_label: String::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Total occurrences across all sources
    pub fn count(&self) -> u64 {
        self.sources.values().map(|s| s.count).sum()
    }

    /// Offsets actually stored across all sources
    pub fn stored_offsets(&self) -> u64 {
        self.sources.values().map(|s| s.offsets.len() as u64).sum()
    }

    /// Apply first-writer-wins metadata; returns true on a conflicting value
    pub(crate) fn merge_meta(&mut self, meta: &HashMeta) -> bool {
        let mut mismatch = false;
        if !meta.block_label.is_empty() {
            if self.block_label.is_empty() {
                self.block_label = meta.block_label.clone();
            } else if self.block_label != meta.block_label {
                mismatch = true;
            }
        }
        if meta.k_entropy != 0 {
            if self.k_entropy == 0 {
                self.k_entropy = meta.k_entropy;
            } else if self.k_entropy != meta.k_entropy {
                mismatch = true;
            }
        }
        mismatch
    }
}
