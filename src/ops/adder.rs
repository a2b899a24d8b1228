//! Copying hashes and sources between databases

use std::collections::HashSet;
use std::path::PathBuf;

use crate::changes::Changes;
use crate::engine::{HashDb, HashEntry, SourceOffsets};
use crate::error::Result;
use crate::hash::HashMeta;

/// Which provenance pairs of a source are carried over
#[derive(Debug, Clone, Copy)]
pub(crate) enum Names<'a> {
    All,
    /// Pairs in this repository only
    Only(&'a str),
    /// Pairs outside this repository
    Except(&'a str),
    /// The smallest pair only
    Canonical,
}

impl Names<'_> {
    fn keep(&self, repository: &str) -> bool {
        match self {
            Names::All | Names::Canonical => true,
            Names::Only(r) => repository == *r,
            Names::Except(r) => repository != *r,
        }
    }
}

/// Writes into one destination, describing each source at most once per
/// input database
pub(crate) struct Adder<'d> {
    dest: &'d HashDb,
    names: Names<'d>,
    copied: HashSet<Vec<u8>>,
    /// (file hash, input database directory) pairs already described
    described: HashSet<(Vec<u8>, PathBuf)>,
    changes: Changes,
}

impl<'d> Adder<'d> {
    pub(crate) fn new(dest: &'d HashDb, names: Names<'d>) -> Self {
        Self {
            dest,
            names,
            copied: HashSet::new(),
            described: HashSet::new(),
            changes: Changes::default(),
        }
    }

    pub(crate) fn into_changes(self) -> Changes {
        self.changes
    }

    /// Copy a source's metadata and names from every database in `from`
    /// that knows it. Names are unioned, so the result does not depend on
    /// the order inputs are copied in.
    pub(crate) fn copy_source(&mut self, file_hash: &[u8], from: &[&HashDb]) -> Result<()> {
        if self.copied.insert(file_hash.to_vec()) {
            self.dest.insert_source(file_hash, &mut self.changes)?;
        }

        let mut names: Vec<(String, String)> = Vec::new();
        for db in from {
            let key = (file_hash.to_vec(), db.dir().to_path_buf());
            if !self.described.insert(key) {
                continue;
            }
            let Some(source) = db.find_source(file_hash) else {
                continue;
            };
            if let Some(metadata) = source.metadata {
                self.dest
                    .insert_source_data(file_hash, metadata, &mut self.changes)?;
            }
            names.extend(
                source
                    .names
                    .into_iter()
                    .filter(|(repository, _)| self.names.keep(repository)),
            );
        }
        names.sort();
        names.dedup();
        if let Names::Canonical = self.names {
            names.truncate(1);
        }
        for (repository, filename) in &names {
            self.dest
                .insert_source_name(file_hash, repository, filename, &mut self.changes)?;
        }
        Ok(())
    }

    /// Merge one source's occurrences of `entry` into the destination
    pub(crate) fn copy_occurrences(
        &mut self,
        entry: &HashEntry,
        occurrences: &SourceOffsets,
    ) -> Result<()> {
        let meta = HashMeta::new(entry.k_entropy, &entry.block_label);
        self.dest.merge_hash(
            &entry.block_hash,
            &occurrences.file_hash,
            occurrences.count,
            &occurrences.offsets,
            &meta,
            &mut self.changes,
        )
    }

    /// Copy every occurrence of `entry` whose source passes `keep`
    pub(crate) fn copy_entry(
        &mut self,
        entry: &HashEntry,
        from: &[&HashDb],
        mut keep: impl FnMut(&[u8]) -> bool,
    ) -> Result<()> {
        for occurrences in &entry.sources {
            if !keep(occurrences.file_hash.as_slice()) {
                continue;
            }
            self.copy_source(&occurrences.file_hash, from)?;
            self.copy_occurrences(entry, occurrences)?;
        }
        Ok(())
    }

    /// Copy a whole database, including sources without hashes
    pub(crate) fn copy_all(&mut self, src: &HashDb) -> Result<()> {
        for entry in src.hash_entries() {
            self.copy_entry(&entry, &[src], |_| true)?;
        }
        for file_hash in src.source_hashes() {
            self.copy_source(&file_hash, &[src])?;
        }
        Ok(())
    }
}
