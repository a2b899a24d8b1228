//! Database settings
//!
//! Versioned configuration written into every database directory as
//! `settings.json`. Settings are fixed at creation time; only the Bloom
//! parameters may change later, through an explicit rebuild.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HashdbError, Result};

/// The settings layout this build reads and writes
pub const SETTINGS_VERSION: u32 = 3;

/// Name of the settings file inside a database directory
pub const SETTINGS_FILENAME: &str = "settings.json";

/// Largest Bloom bit-vector exponent accepted (2^32 bits = 512 MiB)
const MAX_BLOOM_M: u32 = 32;

/// Per-database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub settings_version: u32,

    // -------------------------------------------------------------------------
    // Media Geometry
    // -------------------------------------------------------------------------
    /// Occurrence offsets must be a multiple of this
    pub byte_alignment: u64,

    /// Size of one hashed media block; tab imports multiply indexes by it
    pub block_size: u64,

    // -------------------------------------------------------------------------
    // Hash Index Policy
    // -------------------------------------------------------------------------
    /// Cap on total occurrences per hash, 0 means unlimited
    pub max_duplicates: u64,

    /// Cap on stored offsets per hash; later occurrences are only counted
    pub max_id_offset_pairs: u64,

    /// Bytes of the digest used as the index key, 0 means the full digest
    pub hash_truncation: usize,

    // -------------------------------------------------------------------------
    // Approximate Store Key
    // -------------------------------------------------------------------------
    pub hash_prefix_bits: u32,
    pub hash_suffix_bytes: usize,

    // -------------------------------------------------------------------------
    // Bloom Accelerator
    // -------------------------------------------------------------------------
    pub bloom_used: bool,
    pub bloom_m_hash_size: u32,
    pub bloom_k_hash_functions: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settings_version: SETTINGS_VERSION,
            byte_alignment: 512,
            block_size: 512,
            max_duplicates: 0,
            max_id_offset_pairs: 100_000,
            hash_truncation: 0,
            hash_prefix_bits: 28,
            hash_suffix_bytes: 3,
            bloom_used: true,
            bloom_m_hash_size: 28,
            bloom_k_hash_functions: 3,
        }
    }
}

impl Settings {
    /// Create a new settings builder
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.settings_version != SETTINGS_VERSION {
            return Err(HashdbError::Settings(format!(
                "unsupported settings version {}, expected {}",
                self.settings_version, SETTINGS_VERSION
            )));
        }
        if self.byte_alignment == 0 {
            return Err(HashdbError::Settings("byte_alignment must be at least 1".into()));
        }
        if self.block_size == 0 {
            return Err(HashdbError::Settings("block_size must be at least 1".into()));
        }
        if self.hash_prefix_bits == 0 || self.hash_prefix_bits > 64 {
            return Err(HashdbError::Settings(format!(
                "hash_prefix_bits {} out of range 1..=64",
                self.hash_prefix_bits
            )));
        }
        if self.hash_suffix_bytes > 32 {
            return Err(HashdbError::Settings(format!(
                "hash_suffix_bytes {} out of range 0..=32",
                self.hash_suffix_bytes
            )));
        }
        validate_bloom(self.bloom_m_hash_size, self.bloom_k_hash_functions)
    }

    /// Read and validate `settings.json` from a database directory
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILENAME);
        let text = fs::read_to_string(&path).map_err(|e| {
            HashdbError::Settings(format!("unable to read {}: {}", path.display(), e))
        })?;
        let settings: Settings = serde_json::from_str(&text).map_err(|e| {
            HashdbError::Settings(format!("malformed {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write `settings.json` into a database directory
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(SETTINGS_FILENAME);
        let tmp = dir.join(format!("{}.tmp", SETTINGS_FILENAME));
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Bloom parameters: `M` bits per hash function, `k` hash functions
pub fn validate_bloom(m_hash_size: u32, k_hash_functions: u32) -> Result<()> {
    let max_m = (usize::BITS - 1).min(MAX_BLOOM_M);
    if m_hash_size < 3 || m_hash_size > max_m {
        return Err(HashdbError::Settings(format!(
            "bloom M {} out of range 3..={}",
            m_hash_size, max_m
        )));
    }
    if k_hash_functions == 0 || k_hash_functions > 5 {
        return Err(HashdbError::Settings(format!(
            "bloom k {} out of range 1..=5",
            k_hash_functions
        )));
    }
    Ok(())
}

/// Builder for Settings
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Set the required offset alignment
    pub fn byte_alignment(mut self, alignment: u64) -> Self {
        self.settings.byte_alignment = alignment;
        self
    }

    /// Set the media block size
    pub fn block_size(mut self, size: u64) -> Self {
        self.settings.block_size = size;
        self
    }

    /// Set the per-hash occurrence cap (0 = unlimited)
    pub fn max_duplicates(mut self, max: u64) -> Self {
        self.settings.max_duplicates = max;
        self
    }

    /// Set the per-hash cap on stored offsets
    pub fn max_id_offset_pairs(mut self, max: u64) -> Self {
        self.settings.max_id_offset_pairs = max;
        self
    }

    /// Set how many digest bytes form the index key (0 = full digest)
    pub fn hash_truncation(mut self, bytes: usize) -> Self {
        self.settings.hash_truncation = bytes;
        self
    }

    pub fn hash_prefix_bits(mut self, bits: u32) -> Self {
        self.settings.hash_prefix_bits = bits;
        self
    }

    pub fn hash_suffix_bytes(mut self, bytes: usize) -> Self {
        self.settings.hash_suffix_bytes = bytes;
        self
    }

    /// Enable or disable the Bloom accelerator
    pub fn bloom_used(mut self, used: bool) -> Self {
        self.settings.bloom_used = used;
        self
    }

    /// Set the Bloom parameters
    pub fn bloom(mut self, m_hash_size: u32, k_hash_functions: u32) -> Self {
        self.settings.bloom_m_hash_size = m_hash_size;
        self.settings.bloom_k_hash_functions = k_hash_functions;
        self
    }

    /// Validate and return the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
