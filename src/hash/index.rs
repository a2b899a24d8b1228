//! Hash Index
//!
//! Maps block digests to their occurrences under the capacity policy from
//! [`Settings`].
//!
//! ## Responsibilities
//! - Validate alignment and digest size before touching the map
//! - Reject a full digest that collides with another on the truncated key
//! - Enforce `max_duplicates` and compact past `max_id_offset_pairs`
//! - Keep repeated occurrences idempotent
//!
//! Every mutating call records its outcome in the caller's [`Changes`].

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use crate::changes::{Changes, InsertOutcome, RemoveOutcome};
use crate::config::Settings;
use crate::error::Result;
use crate::store::{RecordFileBuilder, RecordFileReader, StoreKind};

use super::record::{HashMeta, HashRecord, SourceOccurrences};

/// Capacity and validation policy copied out of the settings
#[derive(Debug, Clone, Copy)]
struct Policy {
    byte_alignment: u64,
    max_duplicates: u64,
    max_id_offset_pairs: u64,
    hash_truncation: usize,
}

/// In-memory hash index, persisted as the `hash_store` file
pub struct HashIndex {
    policy: Policy,
    /// Truncated key → record holding the full digest
    records: BTreeMap<Vec<u8>, HashRecord>,
    /// Sum of all record counts
    occurrences: u64,
}

impl HashIndex {
    /// Create an empty index
    pub fn new(settings: &Settings) -> Self {
        Self {
            policy: Policy {
                byte_alignment: settings.byte_alignment,
                max_duplicates: settings.max_duplicates,
                max_id_offset_pairs: settings.max_id_offset_pairs,
                hash_truncation: settings.hash_truncation,
            },
            records: BTreeMap::new(),
            occurrences: 0,
        }
    }

    /// Load the index from its store file
    pub fn load(path: &Path, settings: &Settings) -> Result<Self> {
        let mut index = Self::new(settings);
        let reader = RecordFileReader::open(path, StoreKind::HashIndex)?;
        for record in reader.iter::<HashRecord>() {
            let record = record?;
            index.occurrences += record.count();
            let key = index.key(&record.block_hash).to_vec();
            index.records.insert(key, record);
        }
        Ok(index)
    }

    /// Write the index to its store file
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut builder = RecordFileBuilder::new(path, StoreKind::HashIndex)?;
        for record in self.records.values() {
            builder.add(record)?;
        }
        builder.finish()?;
        Ok(())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Record one occurrence of `digest` at (`source_id`, `offset`)
    pub fn insert(
        &mut self,
        digest: &[u8],
        source_id: u64,
        offset: u64,
        meta: &HashMeta,
        changes: &mut Changes,
    ) -> InsertOutcome {
        let outcome = self.insert_inner(digest, source_id, offset, meta, changes);
        changes.record_insert(outcome);
        outcome
    }

    fn insert_inner(
        &mut self,
        digest: &[u8],
        source_id: u64,
        offset: u64,
        meta: &HashMeta,
        changes: &mut Changes,
    ) -> InsertOutcome {
        if !self.valid_size(digest) {
            return InsertOutcome::InvalidHashSize;
        }
        if offset % self.policy.byte_alignment != 0 {
            return InsertOutcome::InvalidAlignment;
        }
        let policy = self.policy;
        let record = match self.entry(digest) {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };
        if record
            .sources
            .get(&source_id)
            .is_some_and(|s| s.contains(offset))
        {
            return InsertOutcome::DuplicateOccurrence;
        }
        if policy.max_duplicates > 0 && record.count() >= policy.max_duplicates {
            return InsertOutcome::ExceedsMaxDuplicates;
        }
        if record.merge_meta(meta) {
            changes.hash_metadata_mismatch += 1;
        }

        let report_offset = record.stored_offsets() < policy.max_id_offset_pairs;
        let group = record.sources.entry(source_id).or_default();
        group.count += 1;
        if report_offset {
            group.offsets.insert(offset);
        } else {
            group.overflow.insert(offset);
        }
        self.occurrences += 1;
        InsertOutcome::Inserted
    }

    /// Merge a compacted occurrence group: explicit offsets plus `count`
    /// total occurrences for one source.
    ///
    /// Offsets go through [`insert`](Self::insert). The part of `count` not
    /// covered by offsets is merged with max semantics, so merging the same
    /// group twice changes nothing.
    pub fn merge(
        &mut self,
        digest: &[u8],
        source_id: u64,
        count: u64,
        offsets: &[u64],
        meta: &HashMeta,
        changes: &mut Changes,
    ) {
        for &offset in offsets {
            self.insert(digest, source_id, offset, meta, changes);
        }

        let extra = count.saturating_sub(offsets.len() as u64);
        if extra == 0 {
            return;
        }
        if !self.valid_size(digest) {
            changes.hashes_not_inserted_invalid_hash_size += extra;
            return;
        }
        let max_duplicates = self.policy.max_duplicates;
        let record = match self.entry(digest) {
            Ok(record) => record,
            Err(outcome) => {
                for _ in 0..extra {
                    changes.record_insert(outcome);
                }
                return;
            }
        };
        let existing = record
            .sources
            .get(&source_id)
            .map(SourceOccurrences::compacted)
            .unwrap_or(0);
        if extra <= existing {
            changes.hashes_not_inserted_duplicate_occurrence += extra;
            return;
        }
        let wanted = extra - existing;
        let room = if max_duplicates == 0 {
            wanted
        } else {
            max_duplicates.saturating_sub(record.count()).min(wanted)
        };
        if room > 0 {
            if offsets.is_empty() && record.merge_meta(meta) {
                changes.hash_metadata_mismatch += 1;
            }
            record.sources.entry(source_id).or_default().count += room;
        }
        if record.sources.is_empty() {
            let key = self.key(digest).to_vec();
            self.records.remove(&key);
        }
        self.occurrences += room;
        changes.hashes_not_inserted_duplicate_occurrence += existing;
        changes.hashes_inserted += room;
        changes.hashes_not_inserted_exceeds_max_duplicates += wanted - room;
    }

    /// Remove one stored occurrence
    pub fn remove(
        &mut self,
        digest: &[u8],
        source_id: u64,
        offset: u64,
        changes: &mut Changes,
    ) -> RemoveOutcome {
        let outcome = self.remove_inner(digest, source_id, offset);
        changes.record_remove(outcome);
        outcome
    }

    fn remove_inner(&mut self, digest: &[u8], source_id: u64, offset: u64) -> RemoveOutcome {
        if !self.valid_size(digest) {
            return RemoveOutcome::InvalidHashSize;
        }
        if offset % self.policy.byte_alignment != 0 {
            return RemoveOutcome::InvalidAlignment;
        }
        let key = self.key(digest).to_vec();
        let record = match self.records.get_mut(&key) {
            Some(r) if r.block_hash == digest => r,
            _ => return RemoveOutcome::NoSuchHash,
        };
        let Some(group) = record.sources.get_mut(&source_id) else {
            return RemoveOutcome::NoSuchElement;
        };
        if !group.offsets.remove(&offset) && !group.overflow.remove(&offset) {
            return RemoveOutcome::NoSuchElement;
        }
        group.count -= 1;
        if group.count == 0 {
            record.sources.remove(&source_id);
        }
        if record.sources.is_empty() {
            self.records.remove(&key);
        }
        self.occurrences -= 1;
        RemoveOutcome::Removed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Find the record for a full digest
    pub fn lookup(&self, digest: &[u8]) -> Option<&HashRecord> {
        if !self.valid_size(digest) {
            return None;
        }
        self.records
            .get(self.key(digest))
            .filter(|r| r.block_hash == digest)
    }

    /// Smallest stored record
    pub fn first(&self) -> Option<&HashRecord> {
        self.records.values().next()
    }

    /// Record following `digest` in key order
    pub fn next(&self, digest: &[u8]) -> Option<&HashRecord> {
        let key = self.key(digest);
        self.records
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, r)| r)
    }

    /// First record whose key is `>= lo`
    pub fn seek(&self, lo: &[u8]) -> Option<&HashRecord> {
        self.records
            .range::<[u8], _>((Bound::Included(lo), Bound::Unbounded))
            .next()
            .map(|(_, r)| r)
    }

    /// All records in key order
    pub fn iter(&self) -> impl Iterator<Item = &HashRecord> {
        self.records.values()
    }

    /// Number of distinct stored digests
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total occurrences across all records
    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn valid_size(&self, digest: &[u8]) -> bool {
        !digest.is_empty() && digest.len() >= self.policy.hash_truncation
    }

    fn key<'d>(&self, digest: &'d [u8]) -> &'d [u8] {
        match self.policy.hash_truncation {
            0 => digest,
            n => &digest[..n.min(digest.len())],
        }
    }

    /// Existing record for `digest`, or a fresh one; a different full digest
    /// at the same key is a collision.
    fn entry(&mut self, digest: &[u8]) -> std::result::Result<&mut HashRecord, InsertOutcome> {
        let key = self.key(digest).to_vec();
        let record = self
            .records
            .entry(key)
            .or_insert_with(|| HashRecord::new(digest));
        if record.block_hash != digest {
            return Err(InsertOutcome::DuplicateElement);
        }
        Ok(record)
    }
}
