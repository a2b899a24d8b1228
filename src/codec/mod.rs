//! Import/Export Codec
//!
//! Converts between the database stores and their text representations:
//!
//! - line-delimited JSON, one hash or source record per line ([`json`])
//! - tab-delimited `file_hash \t block_hash \t index` triples ([`tab`])
//! - DFXML fileobject/byte_run documents ([`dfxml`])
//!
//! Importers never abort a batch on a bad record: every record ends in a
//! counted outcome in the caller's [`Changes`](crate::changes::Changes).
//! Only unreadable input or a line that is not JSON at all is fatal.

pub mod dfxml;
pub mod export;
pub mod json;
pub mod tab;

use hex::FromHexError;

use crate::error::{HashdbError, Result};

pub use export::{export_json, ExportSummary};
pub use json::{import_json, HashJson, NamePairs, SourceJson, SourceOffsetJson, SourceOffsetList};

/// Decode a hex digest
pub fn parse_digest(text: &str) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Err(HashdbError::InvalidHex("empty hex digest".into()));
    }
    hex::decode(text).map_err(|e| {
        HashdbError::InvalidHex(match e {
            FromHexError::InvalidHexCharacter { .. } => {
                format!("unexpected hex character in '{}'", text)
            }
            FromHexError::OddLength => format!("odd number of hex characters in '{}'", text),
            FromHexError::InvalidStringLength => format!("invalid hex length in '{}'", text),
        })
    })
}

/// Lower-case hex of a digest
pub fn to_hex(digest: &[u8]) -> String {
    hex::encode(digest)
}

// =============================================================================
// Digest Range
// =============================================================================

/// Half-open digest range `[lo, hi)` written as `"lo:hi"` in hex.
///
/// Either side may be empty for an open end, so `"00:80"` and `"80:"`
/// split the digest space in two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashRange {
    pub lo: Option<Vec<u8>>,
    pub hi: Option<Vec<u8>>,
}

impl HashRange {
    pub fn parse(text: &str) -> Result<Self> {
        let (lo, hi) = text
            .split_once(':')
            .ok_or_else(|| HashdbError::InvalidRange(format!("expected lo:hi, got '{}'", text)))?;
        let side = |s: &str| -> Result<Option<Vec<u8>>> {
            if s.is_empty() {
                return Ok(None);
            }
            hex::decode(s)
                .map(Some)
                .map_err(|_| HashdbError::InvalidRange(format!("invalid hex bound '{}'", s)))
        };
        Ok(Self {
            lo: side(lo)?,
            hi: side(hi)?,
        })
    }

    pub fn contains(&self, digest: &[u8]) -> bool {
        self.lo.as_deref().map_or(true, |lo| digest >= lo)
            && self.hi.as_deref().map_or(true, |hi| digest < hi)
    }

    /// True once ascending iteration has passed the upper bound
    pub fn is_past(&self, digest: &[u8]) -> bool {
        self.hi.as_deref().is_some_and(|hi| digest >= hi)
    }
}
