//! Record File Reader
//!
//! Opens a store file, validates header and checksum, and decodes records.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{HashdbError, Result};

use super::iterator::RecordIterator;
use super::{StoreKind, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// A validated store file held in memory
pub struct RecordFileReader {
    path: PathBuf,
    data: Vec<u8>,
    record_count: u64,
}

impl fmt::Debug for RecordFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordFileReader")
            .field("path", &self.path)
            .field("record_count", &self.record_count)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RecordFileReader {
    /// Open a store file and verify magic, version, kind, and data CRC
    pub fn open(path: &Path, kind: StoreKind) -> Result<Self> {
        let data = fs::read(path)?;
        let corrupt = |reason: String| HashdbError::CorruptStore(path.to_path_buf(), reason);

        if (data.len() as u64) < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(format!("file too short: {} bytes", data.len())));
        }

        if &data[0..4] != MAGIC {
            return Err(corrupt(format!(
                "invalid magic: expected HSDB, got {:?}",
                &data[0..4]
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported version: {}", version)));
        }

        match StoreKind::from_u8(data[6]) {
            Some(found) if found == kind => {}
            _ => {
                return Err(corrupt(format!(
                    "wrong store kind {}, expected {:?}",
                    data[6], kind
                )))
            }
        }

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&data[7..15]);
        let record_count = u64::from_le_bytes(count_bytes);

        let footer_start = data.len() - FOOTER_SIZE as usize;
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[footer_start..footer_start + 4]);
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let actual_crc = crc32fast::hash(&data[HEADER_SIZE as usize..footer_start]);
        if stored_crc != actual_crc {
            return Err(corrupt(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, actual_crc
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            record_count,
        })
    }

    /// Number of records the header declares
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Iterate over the decoded records
    pub fn iter<T: DeserializeOwned>(&self) -> RecordIterator<'_, T> {
        let end = self.data.len() - FOOTER_SIZE as usize;
        RecordIterator::new(&self.path, &self.data[HEADER_SIZE as usize..end])
    }

    /// Decode every record, failing if the count disagrees with the header
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let records = self.iter().collect::<Result<Vec<T>>>()?;
        if records.len() as u64 != self.record_count {
            return Err(HashdbError::CorruptStore(
                self.path.clone(),
                format!(
                    "record count mismatch: header {}, found {}",
                    self.record_count,
                    records.len()
                ),
            ));
        }
        Ok(records)
    }
}
