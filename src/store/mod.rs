//! Record Store Module
//!
//! Immutable on-disk files holding one database store each (hash index,
//! source catalog tables, approximate counts). A store is loaded whole into
//! memory on open and rewritten whole on commit.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (15 bytes)                                       │
//! │   Magic: "HSDB" (4) | Version: u16 (2) | Kind: u8 (1)   │
//! │   Count: u64 (8)                                        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [RecordLen: u32][Record (bincode)]                    │
//! │   ... repeated for each record ...                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                        │
//! │   DataCRC: u32 (4) | Padding (4)                        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are built under a `.tmp` name and renamed into place by
//! `finish()`, so readers only ever see complete stores.

mod builder;
mod iterator;
mod reader;

pub use builder::RecordFileBuilder;
pub use iterator::RecordIterator;
pub use reader::RecordFileReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a hashdb store file
pub(crate) const MAGIC: &[u8; 4] = b"HSDB";

/// Current store format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Kind (1) + RecordCount (8)
pub(crate) const HEADER_SIZE: u64 = 15;

/// Footer size: DataCRC (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 8;

/// Upper bound on one encoded record, guards against corrupt length fields
pub(crate) const MAX_RECORD_SIZE: u32 = 256 * 1024 * 1024;

// =============================================================================
// Store Kinds
// =============================================================================

/// Which store a file holds; checked on open so files cannot be swapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreKind {
    HashIndex = 1,
    Approximate = 2,
    SourceId = 3,
    SourceData = 4,
    SourceName = 5,
    Bloom = 6,
}

impl StoreKind {
    /// File name of this store inside a database directory
    pub fn filename(self) -> &'static str {
        match self {
            StoreKind::HashIndex => "hash_store",
            StoreKind::Approximate => "approximate_store",
            StoreKind::SourceId => "source_id_store",
            StoreKind::SourceData => "source_data_store",
            StoreKind::SourceName => "source_name_store",
            StoreKind::Bloom => "bloom_filter",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(StoreKind::HashIndex),
            2 => Some(StoreKind::Approximate),
            3 => Some(StoreKind::SourceId),
            4 => Some(StoreKind::SourceData),
            5 => Some(StoreKind::SourceName),
            6 => Some(StoreKind::Bloom),
            _ => None,
        }
    }
}
