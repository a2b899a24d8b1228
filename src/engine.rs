//! Engine Module
//!
//! The database handle that owns every store of one database directory.
//!
//! ## Responsibilities
//! - Create and open database directories
//! - Route mutations to the hash index, source catalog, approximate store
//!   and Bloom accelerator, keeping them consistent
//! - Resolve hash records into source digests for readers
//! - Persist everything on `commit()`
//!
//! There is no global "current database": callers own a `HashDb` and pass
//! it by reference.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::bloom::BloomFilter;
use crate::changes::{Changes, InsertOutcome, MetadataOutcome, RemoveOutcome};
use crate::config::{validate_bloom, Settings, SETTINGS_FILENAME};
use crate::error::{HashdbError, Result};
use crate::hash::{ApproximateStore, HashIndex, HashMeta, HashRecord};
use crate::source::{SourceCatalog, SourceMetadata};
use crate::store::StoreKind;

/// How a database is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Occurrences of a hash within one source, keyed by file digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOffsets {
    pub file_hash: Vec<u8>,
    pub count: u64,
    pub offsets: Vec<u64>,
}

/// A hash record resolved against the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub block_hash: Vec<u8>,
    pub k_entropy: u64,
    pub block_label: String,
    pub count: u64,
    /// Sorted by file digest
    pub sources: Vec<SourceOffsets>,
}

impl HashEntry {
    /// Fingerprint of the set of sources holding this hash.
    ///
    /// CRC32 chained over the sorted, distinct source file digests, so two
    /// hashes found in the same files share an id.
    pub fn source_list_id(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for source in &self.sources {
            hasher.update(&source.file_hash);
        }
        hasher.finalize()
    }

    /// Occurrences attributed to one source
    pub fn source(&self, file_hash: &[u8]) -> Option<&SourceOffsets> {
        self.sources.iter().find(|s| s.file_hash == file_hash)
    }
}

/// A source resolved with its metadata and provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub file_hash: Vec<u8>,
    /// `None` when no metadata was ever attached
    pub metadata: Option<SourceMetadata>,
    /// Sorted (repository, filename) pairs
    pub names: Vec<(String, String)>,
}

impl SourceEntry {
    /// True when any provenance pair names `repository`
    pub fn has_repository(&self, repository: &str) -> bool {
        self.names.iter().any(|(r, _)| r == repository)
    }
}

/// Store sizes of one database
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SizeInfo {
    pub hashes: u64,
    pub occurrences: u64,
    pub sources: u64,
    pub approximate_entries: u64,
    pub bloom_bits_set: u64,
}

struct State {
    hashes: HashIndex,
    approximate: ApproximateStore,
    sources: SourceCatalog,
    bloom: Option<BloomFilter>,
}

impl State {
    fn entry(&self, record: &HashRecord) -> HashEntry {
        let mut sources: Vec<SourceOffsets> = record
            .sources
            .iter()
            .filter_map(|(&source_id, occurrences)| {
                let file_hash = match self.sources.file_hash(source_id) {
                    Some(h) => h.to_vec(),
                    None => {
                        tracing::warn!(source_id, "hash references unknown source id");
                        return None;
                    }
                };
                Some(SourceOffsets {
                    file_hash,
                    count: occurrences.count,
                    offsets: occurrences.offsets.iter().copied().collect(),
                })
            })
            .collect();
        sources.sort_by(|a, b| a.file_hash.cmp(&b.file_hash));
        HashEntry {
            block_hash: record.block_hash.clone(),
            k_entropy: record.k_entropy,
            block_label: record.block_label.clone(),
            count: record.count(),
            sources,
        }
    }

    fn count_of(&self, digest: &[u8]) -> u64 {
        self.hashes.lookup(digest).map(HashRecord::count).unwrap_or(0)
    }
}

/// An open hash database
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// All stores live behind one `RwLock`. Readers (scan, export) share it;
/// each mutation takes it exclusively for one record. Only one handle per
/// directory may be open read-write at a time; that is the caller's duty.
pub struct HashDb {
    dir: PathBuf,
    mode: OpenMode,
    /// Only the Bloom fields ever change after creation
    settings: RwLock<Settings>,
    state: RwLock<State>,
}

impl HashDb {
    /// Create a new, empty database directory
    pub fn create(dir: &Path, settings: &Settings) -> Result<()> {
        if dir.exists() {
            return Err(HashdbError::AlreadyExists(dir.to_path_buf()));
        }
        settings.validate()?;
        fs::create_dir_all(dir)?;
        settings.save(dir)?;

        HashIndex::new(settings).save(&dir.join(StoreKind::HashIndex.filename()))?;
        ApproximateStore::new(settings).save(&dir.join(StoreKind::Approximate.filename()))?;
        SourceCatalog::new().save(dir)?;
        if settings.bloom_used {
            BloomFilter::new(settings.bloom_m_hash_size, settings.bloom_k_hash_functions)?
                .save(&dir.join(StoreKind::Bloom.filename()))?;
        }

        tracing::info!(dir = %dir.display(), "created database");
        Ok(())
    }

    /// Open an existing database, loading every store into memory
    pub fn open(dir: &Path, mode: OpenMode) -> Result<Self> {
        if !dir.join(SETTINGS_FILENAME).is_file() {
            return Err(HashdbError::NotFound(dir.to_path_buf()));
        }
        let settings = Settings::load(dir)?;

        let hashes = HashIndex::load(&dir.join(StoreKind::HashIndex.filename()), &settings)?;
        let approximate =
            ApproximateStore::load(&dir.join(StoreKind::Approximate.filename()), &settings)?;
        let sources = SourceCatalog::load(dir)?;
        let bloom = if settings.bloom_used {
            Some(Self::open_bloom(dir, &settings, &hashes)?)
        } else {
            None
        };

        tracing::debug!(
            dir = %dir.display(),
            hashes = hashes.len(),
            sources = sources.len(),
            ?mode,
            "opened database"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            mode,
            settings: RwLock::new(settings),
            state: RwLock::new(State {
                hashes,
                approximate,
                sources,
                bloom,
            }),
        })
    }

    /// Load the Bloom filter, rebuilding it if missing or stale
    fn open_bloom(dir: &Path, settings: &Settings, hashes: &HashIndex) -> Result<BloomFilter> {
        let path = dir.join(StoreKind::Bloom.filename());
        if path.is_file() {
            let filter = BloomFilter::load(&path)?;
            if filter.m_hash_size() == settings.bloom_m_hash_size
                && filter.k_hash_functions() == settings.bloom_k_hash_functions
            {
                return Ok(filter);
            }
            tracing::warn!(path = %path.display(), "bloom filter parameters changed, rebuilding");
        } else {
            tracing::warn!(path = %path.display(), "bloom filter missing, rebuilding");
        }
        Self::build_bloom(settings.bloom_m_hash_size, settings.bloom_k_hash_functions, hashes)
    }

    fn build_bloom(m_hash_size: u32, k_hash_functions: u32, hashes: &HashIndex) -> Result<BloomFilter> {
        let mut filter = BloomFilter::new(m_hash_size, k_hash_functions)?;
        for record in hashes.iter() {
            filter.add(&record.block_hash);
        }
        Ok(filter)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    fn writable(&self) -> Result<RwLockWriteGuard<'_, State>> {
        match self.mode {
            OpenMode::ReadWrite => Ok(self.state.write()),
            OpenMode::ReadOnly => Err(HashdbError::ReadOnly),
        }
    }

    // =========================================================================
    // Source Mutation
    // =========================================================================

    /// Intern a source without attaching anything to it
    pub fn insert_source(&self, file_hash: &[u8], changes: &mut Changes) -> Result<()> {
        let mut state = self.writable()?;
        state.sources.intern_source(file_hash, changes);
        Ok(())
    }

    /// Attach metadata to a source, interning it if needed
    pub fn insert_source_data(
        &self,
        file_hash: &[u8],
        metadata: SourceMetadata,
        changes: &mut Changes,
    ) -> Result<MetadataOutcome> {
        let mut state = self.writable()?;
        let source_id = state.sources.intern_source(file_hash, changes);
        Ok(state.sources.set_metadata(source_id, metadata, changes))
    }

    /// Add a provenance pair to a source, interning it if needed
    pub fn insert_source_name(
        &self,
        file_hash: &[u8],
        repository_name: &str,
        filename: &str,
        changes: &mut Changes,
    ) -> Result<bool> {
        let mut state = self.writable()?;
        let source_id = state.sources.intern_source(file_hash, changes);
        Ok(state
            .sources
            .add_name(source_id, repository_name, filename, changes))
    }

    // =========================================================================
    // Hash Mutation
    // =========================================================================

    /// Record one occurrence of `block_hash` in `file_hash` at `offset`
    pub fn insert_hash(
        &self,
        block_hash: &[u8],
        file_hash: &[u8],
        offset: u64,
        meta: &HashMeta,
        changes: &mut Changes,
    ) -> Result<InsertOutcome> {
        let mut state = self.writable()?;
        let state = &mut *state;
        let source_id = state.sources.intern_source(file_hash, changes);
        let outcome = state
            .hashes
            .insert(block_hash, source_id, offset, meta, changes);
        if outcome == InsertOutcome::Inserted {
            state.approximate.add(block_hash, 1);
            if let Some(bloom) = state.bloom.as_mut() {
                bloom.add(block_hash);
            }
        }
        Ok(outcome)
    }

    /// Merge a compacted occurrence group (`count` total, some `offsets`)
    pub fn merge_hash(
        &self,
        block_hash: &[u8],
        file_hash: &[u8],
        count: u64,
        offsets: &[u64],
        meta: &HashMeta,
        changes: &mut Changes,
    ) -> Result<()> {
        let mut state = self.writable()?;
        let state = &mut *state;
        let source_id = state.sources.intern_source(file_hash, changes);
        let before = state.count_of(block_hash);
        state
            .hashes
            .merge(block_hash, source_id, count, offsets, meta, changes);
        let after = state.count_of(block_hash);
        if after > before {
            state.approximate.add(block_hash, after - before);
            if let Some(bloom) = state.bloom.as_mut() {
                bloom.add(block_hash);
            }
        }
        Ok(())
    }

    /// Remove one stored occurrence
    pub fn remove_hash(
        &self,
        block_hash: &[u8],
        file_hash: &[u8],
        offset: u64,
        changes: &mut Changes,
    ) -> Result<RemoveOutcome> {
        let mut state = self.writable()?;
        let state = &mut *state;
        let source_id = match state.sources.source_id(file_hash) {
            Some(id) => id,
            // Unknown source: still run validation so the reason is exact
            None => u64::MAX,
        };
        let outcome = state.hashes.remove(block_hash, source_id, offset, changes);
        if outcome == RemoveOutcome::Removed {
            state.approximate.subtract(block_hash, 1);
        }
        Ok(outcome)
    }

    // =========================================================================
    // Hash Queries
    // =========================================================================

    /// Resolve a block digest
    pub fn find_hash(&self, block_hash: &[u8]) -> Option<HashEntry> {
        let state = self.state.read();
        state.hashes.lookup(block_hash).map(|r| state.entry(r))
    }

    /// Exact occurrence count, `None` when absent
    pub fn find_hash_count(&self, block_hash: &[u8]) -> Option<u64> {
        self.state
            .read()
            .hashes
            .lookup(block_hash)
            .map(HashRecord::count)
    }

    /// Upper-bound occurrence count; 0 means definitely absent
    pub fn find_approximate_hash_count(&self, block_hash: &[u8]) -> u64 {
        let state = self.state.read();
        if let Some(bloom) = &state.bloom {
            if !bloom.maybe_present(block_hash) {
                return 0;
            }
        }
        state.approximate.count(block_hash)
    }

    /// Bloom membership; always true when the filter is disabled
    pub fn maybe_present(&self, block_hash: &[u8]) -> bool {
        match &self.state.read().bloom {
            Some(bloom) => bloom.maybe_present(block_hash),
            None => true,
        }
    }

    /// Smallest stored block digest
    pub fn first_hash(&self) -> Option<Vec<u8>> {
        self.state.read().hashes.first().map(|r| r.block_hash.clone())
    }

    /// Block digest following `block_hash`
    pub fn next_hash(&self, block_hash: &[u8]) -> Option<Vec<u8>> {
        self.state
            .read()
            .hashes
            .next(block_hash)
            .map(|r| r.block_hash.clone())
    }

    /// First stored block digest at or after `lo`
    pub fn seek_hash(&self, lo: &[u8]) -> Option<Vec<u8>> {
        self.state.read().hashes.seek(lo).map(|r| r.block_hash.clone())
    }

    /// Every hash entry in ascending digest order
    pub fn hash_entries(&self) -> Vec<HashEntry> {
        let state = self.state.read();
        state.hashes.iter().map(|r| state.entry(r)).collect()
    }

    // =========================================================================
    // Source Queries
    // =========================================================================

    pub fn has_source(&self, file_hash: &[u8]) -> bool {
        self.state.read().sources.source_id(file_hash).is_some()
    }

    /// Resolve a source by file digest
    pub fn find_source(&self, file_hash: &[u8]) -> Option<SourceEntry> {
        let state = self.state.read();
        let source_id = state.sources.source_id(file_hash)?;
        Some(SourceEntry {
            file_hash: file_hash.to_vec(),
            metadata: state.sources.metadata(source_id).cloned(),
            names: state.sources.names(source_id).cloned().collect(),
        })
    }

    /// Smallest source file digest
    pub fn first_source(&self) -> Option<Vec<u8>> {
        self.state.read().sources.first_source().map(<[u8]>::to_vec)
    }

    /// Source file digest following `file_hash`
    pub fn next_source(&self, file_hash: &[u8]) -> Option<Vec<u8>> {
        self.state
            .read()
            .sources
            .next_source(file_hash)
            .map(<[u8]>::to_vec)
    }

    /// Every source file digest in ascending order
    pub fn source_hashes(&self) -> Vec<Vec<u8>> {
        self.state
            .read()
            .sources
            .iter()
            .map(|(h, _)| h.to_vec())
            .collect()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub fn size(&self) -> SizeInfo {
        let state = self.state.read();
        SizeInfo {
            hashes: state.hashes.len() as u64,
            occurrences: state.hashes.occurrences(),
            sources: state.sources.len() as u64,
            approximate_entries: state.approximate.len() as u64,
            bloom_bits_set: state.bloom.as_ref().map(BloomFilter::bits_set).unwrap_or(0),
        }
    }

    /// Replace the Bloom accelerator with a fresh one built from the index.
    ///
    /// Writes the new settings and filter immediately; disabling deletes the
    /// filter file. An interrupted rebuild needs another rebuild.
    pub fn rebuild_bloom(&self, used: bool, m_hash_size: u32, k_hash_functions: u32) -> Result<()> {
        let mut state = self.writable()?;
        validate_bloom(m_hash_size, k_hash_functions)?;

        let bloom_path = self.dir.join(StoreKind::Bloom.filename());
        let mut settings = self.settings.write();
        settings.bloom_used = used;
        settings.bloom_m_hash_size = m_hash_size;
        settings.bloom_k_hash_functions = k_hash_functions;

        if used {
            let filter = Self::build_bloom(m_hash_size, k_hash_functions, &state.hashes)?;
            filter.save(&bloom_path)?;
            state.bloom = Some(filter);
        } else {
            state.bloom = None;
            if bloom_path.exists() {
                fs::remove_file(&bloom_path)?;
            }
        }
        settings.save(&self.dir)?;

        tracing::info!(used, m_hash_size, k_hash_functions, "rebuilt bloom filter");
        Ok(())
    }

    /// Persist every store; each file is replaced atomically
    pub fn commit(&self) -> Result<()> {
        let state = match self.mode {
            OpenMode::ReadWrite => self.state.read(),
            OpenMode::ReadOnly => return Err(HashdbError::ReadOnly),
        };
        state
            .hashes
            .save(&self.dir.join(StoreKind::HashIndex.filename()))?;
        state
            .approximate
            .save(&self.dir.join(StoreKind::Approximate.filename()))?;
        state.sources.save(&self.dir)?;

        let bloom_path = self.dir.join(StoreKind::Bloom.filename());
        match &state.bloom {
            Some(bloom) => bloom.save(&bloom_path)?,
            None if bloom_path.exists() => fs::remove_file(&bloom_path)?,
            None => {}
        }

        tracing::debug!(dir = %self.dir.display(), "committed database");
        Ok(())
    }
}
