//! Source Catalog
//!
//! ## Responsibilities
//! - Assign monotonically increasing ids to file digests
//! - Hold file metadata, first writer wins
//! - Hold the provenance set of each source
//!
//! Persisted as three stores: `source_id_store`, `source_data_store` and
//! `source_name_store`.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::changes::{Changes, MetadataOutcome};
use crate::error::{HashdbError, Result};
use crate::store::{RecordFileBuilder, RecordFileReader, StoreKind};

/// Descriptive data for one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub filesize: u64,
    pub file_type: String,
    pub zero_count: u64,
    pub nonprobative_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdRecord {
    file_hash: Vec<u8>,
    source_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DataRecord {
    source_id: u64,
    metadata: SourceMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct NameRecord {
    source_id: u64,
    repository_name: String,
    filename: String,
}

/// In-memory source catalog
#[derive(Default)]
pub struct SourceCatalog {
    ids: BTreeMap<Vec<u8>, u64>,
    digests: BTreeMap<u64, Vec<u8>>,
    metadata: BTreeMap<u64, SourceMetadata>,
    names: BTreeMap<u64, BTreeSet<(String, String)>>,
    next_id: u64,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Load the three catalog stores from a database directory
    pub fn load(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();

        let id_path = dir.join(StoreKind::SourceId.filename());
        let reader = RecordFileReader::open(&id_path, StoreKind::SourceId)?;
        for record in reader.iter::<IdRecord>() {
            let record = record?;
            if catalog.digests.contains_key(&record.source_id) {
                return Err(HashdbError::CorruptStore(
                    id_path,
                    format!("source id {} assigned twice", record.source_id),
                ));
            }
            catalog.next_id = catalog.next_id.max(record.source_id + 1);
            catalog.digests.insert(record.source_id, record.file_hash.clone());
            catalog.ids.insert(record.file_hash, record.source_id);
        }

        let reader = RecordFileReader::open(
            &dir.join(StoreKind::SourceData.filename()),
            StoreKind::SourceData,
        )?;
        for record in reader.iter::<DataRecord>() {
            let record = record?;
            catalog.metadata.insert(record.source_id, record.metadata);
        }

        let reader = RecordFileReader::open(
            &dir.join(StoreKind::SourceName.filename()),
            StoreKind::SourceName,
        )?;
        for record in reader.iter::<NameRecord>() {
            let record = record?;
            catalog
                .names
                .entry(record.source_id)
                .or_default()
                .insert((record.repository_name, record.filename));
        }

        Ok(catalog)
    }

    /// Write the three catalog stores into a database directory
    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut builder =
            RecordFileBuilder::new(&dir.join(StoreKind::SourceId.filename()), StoreKind::SourceId)?;
        for (file_hash, &source_id) in &self.ids {
            builder.add(&IdRecord {
                file_hash: file_hash.clone(),
                source_id,
            })?;
        }
        builder.finish()?;

        let mut builder = RecordFileBuilder::new(
            &dir.join(StoreKind::SourceData.filename()),
            StoreKind::SourceData,
        )?;
        for (&source_id, metadata) in &self.metadata {
            builder.add(&DataRecord {
                source_id,
                metadata: metadata.clone(),
            })?;
        }
        builder.finish()?;

        let mut builder = RecordFileBuilder::new(
            &dir.join(StoreKind::SourceName.filename()),
            StoreKind::SourceName,
        )?;
        for (&source_id, pairs) in &self.names {
            for (repository_name, filename) in pairs {
                builder.add(&NameRecord {
                    source_id,
                    repository_name: repository_name.clone(),
                    filename: filename.clone(),
                })?;
            }
        }
        builder.finish()?;
        Ok(())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Id for `file_hash`, assigning the next one on first sight
    pub fn intern_source(&mut self, file_hash: &[u8], changes: &mut Changes) -> u64 {
        if let Some(&id) = self.ids.get(file_hash) {
            changes.source_ids_already_present += 1;
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(file_hash.to_vec(), id);
        self.digests.insert(id, file_hash.to_vec());
        changes.source_ids_inserted += 1;
        id
    }

    /// Attach metadata; an existing, different description is kept
    pub fn set_metadata(
        &mut self,
        source_id: u64,
        metadata: SourceMetadata,
        changes: &mut Changes,
    ) -> MetadataOutcome {
        let outcome = match self.metadata.get(&source_id) {
            None => {
                self.metadata.insert(source_id, metadata);
                MetadataOutcome::Inserted
            }
            Some(existing) if *existing == metadata => MetadataOutcome::Same,
            Some(existing) => {
                tracing::warn!(
                    source_id,
                    existing = ?existing,
                    rejected = ?metadata,
                    "source metadata mismatch, keeping first description"
                );
                MetadataOutcome::MetadataMismatch
            }
        };
        changes.record_metadata(outcome);
        outcome
    }

    /// Add a provenance pair; returns false if it was already present
    pub fn add_name(
        &mut self,
        source_id: u64,
        repository_name: &str,
        filename: &str,
        changes: &mut Changes,
    ) -> bool {
        let inserted = self
            .names
            .entry(source_id)
            .or_default()
            .insert((repository_name.to_string(), filename.to_string()));
        if inserted {
            changes.source_names_inserted += 1;
        } else {
            changes.source_names_already_present += 1;
        }
        inserted
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn source_id(&self, file_hash: &[u8]) -> Option<u64> {
        self.ids.get(file_hash).copied()
    }

    pub fn file_hash(&self, source_id: u64) -> Option<&[u8]> {
        self.digests.get(&source_id).map(Vec::as_slice)
    }

    pub fn metadata(&self, source_id: u64) -> Option<&SourceMetadata> {
        self.metadata.get(&source_id)
    }

    /// Provenance pairs in sorted order
    pub fn names(&self, source_id: u64) -> impl Iterator<Item = &(String, String)> {
        self.names.get(&source_id).into_iter().flatten()
    }

    /// Smallest file digest
    pub fn first_source(&self) -> Option<&[u8]> {
        self.ids.keys().next().map(Vec::as_slice)
    }

    /// File digest following `file_hash`
    pub fn next_source(&self, file_hash: &[u8]) -> Option<&[u8]> {
        self.ids
            .range::<[u8], _>((Bound::Excluded(file_hash), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.as_slice())
    }

    /// (file_hash, source_id) in ascending digest order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.ids.iter().map(|(k, &id)| (k.as_slice(), id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
