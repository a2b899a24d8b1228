//! Approximate hash store
//!
//! A compact count store keyed by the leading `hash_prefix_bits` of a
//! digest. Each prefix bucket holds `(suffix, count)` pairs where the suffix
//! is the trailing `hash_suffix_bytes` of the digest. Digests agreeing on
//! prefix and suffix share a counter, so a reported count can be inflated
//! by unrelated digests but never falls below the exact count.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::Result;
use crate::store::{RecordFileBuilder, RecordFileReader, StoreKind};

/// One persisted bucket entry
#[derive(Debug, Serialize, Deserialize)]
struct ApproximateEntry {
    prefix: u64,
    suffix: Vec<u8>,
    count: u64,
}

pub struct ApproximateStore {
    prefix_bits: u32,
    suffix_bytes: usize,
    buckets: BTreeMap<u64, Vec<(Vec<u8>, u64)>>,
}

impl ApproximateStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            prefix_bits: settings.hash_prefix_bits,
            suffix_bytes: settings.hash_suffix_bytes,
            buckets: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path, settings: &Settings) -> Result<Self> {
        let mut store = Self::new(settings);
        let reader = RecordFileReader::open(path, StoreKind::Approximate)?;
        for entry in reader.iter::<ApproximateEntry>() {
            let entry = entry?;
            store
                .buckets
                .entry(entry.prefix)
                .or_default()
                .push((entry.suffix, entry.count));
        }
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut builder = RecordFileBuilder::new(path, StoreKind::Approximate)?;
        for (prefix, bucket) in &self.buckets {
            for (suffix, count) in bucket {
                builder.add(&ApproximateEntry {
                    prefix: *prefix,
                    suffix: suffix.clone(),
                    count: *count,
                })?;
            }
        }
        builder.finish()?;
        Ok(())
    }

    /// Add `n` occurrences of `digest`
    pub fn add(&mut self, digest: &[u8], n: u64) {
        if n == 0 {
            return;
        }
        let prefix = self.prefix(digest);
        let suffix = self.suffix(digest);
        let bucket = self.buckets.entry(prefix).or_default();
        match bucket.iter_mut().find(|(s, _)| *s == suffix) {
            Some((_, count)) => *count = count.saturating_add(n),
            None => bucket.push((suffix.to_vec(), n)),
        }
    }

    /// Remove `n` occurrences of `digest`
    pub fn subtract(&mut self, digest: &[u8], n: u64) {
        let prefix = self.prefix(digest);
        let suffix = self.suffix(digest);
        if let Some(bucket) = self.buckets.get_mut(&prefix) {
            if let Some(pos) = bucket.iter().position(|(s, _)| *s == suffix) {
                bucket[pos].1 = bucket[pos].1.saturating_sub(n);
                if bucket[pos].1 == 0 {
                    bucket.swap_remove(pos);
                }
            }
            if bucket.is_empty() {
                self.buckets.remove(&prefix);
            }
        }
    }

    /// Upper-bound occurrence count for `digest`, 0 when surely absent
    pub fn count(&self, digest: &[u8]) -> u64 {
        let suffix = self.suffix(digest);
        self.buckets
            .get(&self.prefix(digest))
            .and_then(|bucket| bucket.iter().find(|(s, _)| *s == suffix))
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Number of distinct (prefix, suffix) entries
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn prefix(&self, digest: &[u8]) -> u64 {
        let mut word = [0u8; 8];
        let n = digest.len().min(8);
        word[..n].copy_from_slice(&digest[..n]);
        u64::from_be_bytes(word) >> (64 - self.prefix_bits)
    }

    fn suffix<'d>(&self, digest: &'d [u8]) -> &'d [u8] {
        &digest[digest.len().saturating_sub(self.suffix_bytes)..]
    }
}
