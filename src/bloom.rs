//! Bloom Accelerator
//!
//! A no-false-negative membership filter over the stored block digests.
//! Digests are already uniformly distributed, so the `k` hash functions
//! are simply `k` windows of `M` bits taken from the digest itself.
//!
//! ## File Format
//! Stored as a `bloom_filter` record file: one header record carrying
//! `M` and `k`, then the bit vector in fixed-size word chunks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::validate_bloom;
use crate::error::{HashdbError, Result};
use crate::store::{RecordFileBuilder, RecordFileReader, StoreKind};

/// Words per persisted chunk (512 KiB)
const CHUNK_WORDS: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
enum BloomRecord {
    Header { m_hash_size: u32, k_hash_functions: u32 },
    Chunk(Vec<u64>),
}

/// Bit-vector membership filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    m_hash_size: u32,
    k_hash_functions: u32,
    bits: Vec<u64>,
}

impl BloomFilter {
    /// Create an empty filter of `2^m_hash_size` bits
    pub fn new(m_hash_size: u32, k_hash_functions: u32) -> Result<Self> {
        validate_bloom(m_hash_size, k_hash_functions)?;
        let words = ((1u64 << m_hash_size) / 64).max(1) as usize;
        Ok(Self {
            m_hash_size,
            k_hash_functions,
            bits: vec![0u64; words],
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = RecordFileReader::open(path, StoreKind::Bloom)?;
        let corrupt = |reason: &str| HashdbError::CorruptStore(path.to_path_buf(), reason.into());

        let mut records = reader.iter::<BloomRecord>();
        let mut filter = match records.next() {
            Some(Ok(BloomRecord::Header {
                m_hash_size,
                k_hash_functions,
            })) => {
                let mut filter = Self::new(m_hash_size, k_hash_functions)?;
                filter.bits.clear();
                filter
            }
            Some(Err(e)) => return Err(e),
            _ => return Err(corrupt("missing bloom header")),
        };
        for record in records {
            match record? {
                BloomRecord::Chunk(words) => filter.bits.extend_from_slice(&words),
                BloomRecord::Header { .. } => return Err(corrupt("duplicate bloom header")),
            }
        }
        let expected = ((1u64 << filter.m_hash_size) / 64).max(1) as usize;
        if filter.bits.len() != expected {
            return Err(corrupt("bloom bit vector has the wrong size"));
        }
        Ok(filter)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut builder = RecordFileBuilder::new(path, StoreKind::Bloom)?;
        builder.add(&BloomRecord::Header {
            m_hash_size: self.m_hash_size,
            k_hash_functions: self.k_hash_functions,
        })?;
        for chunk in self.bits.chunks(CHUNK_WORDS) {
            builder.add(&BloomRecord::Chunk(chunk.to_vec()))?;
        }
        builder.finish()?;
        Ok(())
    }

    /// Set the bits for `digest`
    pub fn add(&mut self, digest: &[u8]) {
        for bit in self.bit_positions(digest) {
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// False only if `digest` was never added
    pub fn maybe_present(&self, digest: &[u8]) -> bool {
        self.bit_positions(digest)
            .all(|bit| self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    pub fn m_hash_size(&self) -> u32 {
        self.m_hash_size
    }

    pub fn k_hash_functions(&self) -> u32 {
        self.k_hash_functions
    }

    /// Number of set bits, for statistics
    pub fn bits_set(&self) -> u64 {
        self.bits.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Bit index for each hash function.
    ///
    /// The digest is zero-extended or truncated to 16 bytes; function `i`
    /// reads `M` bits starting at bit `i * M`, wrapping around the 128 bits.
    fn bit_positions(&self, digest: &[u8]) -> impl Iterator<Item = u64> {
        let mut buf = [0u8; 16];
        let n = digest.len().min(16);
        buf[..n].copy_from_slice(&digest[..n]);
        let value = u128::from_le_bytes(buf);
        let m = self.m_hash_size;
        let mask = (1u128 << m) - 1;
        let total_bits = (self.bits.len() as u64) * 64;
        (0..self.k_hash_functions).map(move |i| {
            let window = (value.rotate_right((i * m) % 128) & mask) as u64;
            window % total_bits
        })
    }
}
