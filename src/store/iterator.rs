//! Record Iterator
//!
//! Sequential decoding of the data block of a store file.

use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{HashdbError, Result};

use super::MAX_RECORD_SIZE;

/// Iterator over the records of a store file, in file order
pub struct RecordIterator<'a, T> {
    path: &'a Path,
    data: &'a [u8],
    pos: usize,
    failed: bool,
    _record: PhantomData<T>,
}

impl<'a, T> RecordIterator<'a, T> {
    pub(super) fn new(path: &'a Path, data: &'a [u8]) -> Self {
        Self {
            path,
            data,
            pos: 0,
            failed: false,
            _record: PhantomData,
        }
    }

    fn corrupt(&mut self, reason: String) -> Option<Result<T>> {
        self.failed = true;
        Some(Err(HashdbError::CorruptStore(self.path.to_path_buf(), reason)))
    }
}

impl<'a, T: DeserializeOwned> Iterator for RecordIterator<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }

        if self.pos + 4 > self.data.len() {
            return self.corrupt(format!("truncated record header at {}", self.pos));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_RECORD_SIZE {
            return self.corrupt(format!("record length {} too large", len));
        }
        self.pos += 4;

        let end = self.pos + len as usize;
        if end > self.data.len() {
            return self.corrupt(format!("truncated record at {}", self.pos));
        }
        let record = bincode::deserialize::<T>(&self.data[self.pos..end]);
        self.pos = end;

        match record {
            Ok(r) => Some(Ok(r)),
            Err(e) => self.corrupt(format!("undecodable record: {}", e)),
        }
    }
}
