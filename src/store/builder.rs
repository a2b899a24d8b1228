//! Record File Builder
//!
//! Writes records to a new store file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HashdbError, Result};

use super::{StoreKind, MAGIC, VERSION};

/// Builder for a store file
pub struct RecordFileBuilder {
    /// Final file path
    path: PathBuf,
    /// Path being written until `finish()` renames it
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    record_count: u64,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl RecordFileBuilder {
    /// Create a new builder
    ///
    /// Writes the header immediately; call `add()` for each record, then
    /// `finish()` to write the footer and move the file into place.
    pub fn new(path: &Path, kind: StoreKind) -> Result<Self> {
        let tmp_path = path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&[kind as u8])?;
        writer.write_all(&0u64.to_le_bytes())?; // Placeholder for record count

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            record_count: 0,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Append one record
    pub fn add<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let encoded = bincode::serialize(record)?;
        let len_bytes = (encoded.len() as u32).to_le_bytes();

        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(&encoded)?;

        self.data_hasher.update(&len_bytes);
        self.data_hasher.update(&encoded);

        self.record_count += 1;
        Ok(())
    }

    /// Write the footer, patch the header count, and rename into place
    pub fn finish(mut self) -> Result<u64> {
        let data_crc = self.data_hasher.finalize();

        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| {
            HashdbError::Serialization(format!("failed to flush store: {}", e))
        })?;
        file.seek(SeekFrom::Start(7))?; // After magic + version + kind
        file.write_all(&self.record_count.to_le_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        Ok(self.record_count)
    }
}
