//! JSON record codec
//!
//! Hash record:
//! ```text
//! {"block_hash":"2222","k_entropy":1,"block_label":"bl","source_offsets":["11",2,[0,512]]}
//! ```
//! Source record:
//! ```text
//! {"file_hash":"11","filesize":1,"file_type":"ft","zero_count":2,"nonprobative_count":3,"name_pairs":["repo","file"]}
//! ```
//! `source_offsets` is a flat array of `file_hash, count, [offsets]`
//! triples and `name_pairs` a flat array of `repository, filename` pairs.

use std::io::BufRead;

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::changes::Changes;
use crate::engine::{HashDb, HashEntry, SourceEntry};
use crate::error::Result;
use crate::hash::HashMeta;
use crate::source::SourceMetadata;

use super::{parse_digest, to_hex};

// =============================================================================
// Record Shapes
// =============================================================================

/// One `file_hash, count, [offsets]` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOffsetJson {
    pub file_hash: String,
    pub count: u64,
    pub offsets: Vec<u64>,
}

/// Flat `source_offsets` array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOffsetList(pub Vec<SourceOffsetJson>);

impl Serialize for SourceOffsetList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len() * 3))?;
        for entry in &self.0 {
            seq.serialize_element(&entry.file_hash)?;
            seq.serialize_element(&entry.count)?;
            seq.serialize_element(&entry.offsets)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SourceOffsetList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
        if values.len() % 3 != 0 {
            return Err(D::Error::custom(
                "source_offsets must hold file_hash, count, offsets triples",
            ));
        }
        values
            .chunks(3)
            .map(|triple| {
                let file_hash = triple[0]
                    .as_str()
                    .ok_or_else(|| D::Error::custom("source_offsets file_hash must be a string"))?;
                let count = triple[1]
                    .as_u64()
                    .ok_or_else(|| D::Error::custom("source_offsets count must be an integer"))?;
                let offsets = triple[2]
                    .as_array()
                    .ok_or_else(|| D::Error::custom("source_offsets offsets must be an array"))?
                    .iter()
                    .map(|v| {
                        v.as_u64()
                            .ok_or_else(|| D::Error::custom("offset must be an integer"))
                    })
                    .collect::<std::result::Result<Vec<u64>, D::Error>>()?;
                Ok(SourceOffsetJson {
                    file_hash: file_hash.to_string(),
                    count,
                    offsets,
                })
            })
            .collect::<std::result::Result<Vec<_>, D::Error>>()
            .map(SourceOffsetList)
    }
}

/// Flat `name_pairs` array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePairs(pub Vec<(String, String)>);

impl Serialize for NamePairs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len() * 2))?;
        for (repository_name, filename) in &self.0 {
            seq.serialize_element(repository_name)?;
            seq.serialize_element(filename)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for NamePairs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        if names.len() % 2 != 0 {
            return Err(D::Error::custom(
                "name_pairs must hold repository_name, filename pairs",
            ));
        }
        Ok(NamePairs(
            names
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        ))
    }
}

/// Hash record line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashJson {
    pub block_hash: String,
    #[serde(default)]
    pub k_entropy: u64,
    #[serde(default)]
    pub block_label: String,
    #[serde(default)]
    pub source_offsets: SourceOffsetList,
}

impl HashJson {
    pub fn from_entry(entry: &HashEntry) -> Self {
        Self {
            block_hash: to_hex(&entry.block_hash),
            k_entropy: entry.k_entropy,
            block_label: entry.block_label.clone(),
            source_offsets: source_offsets(entry),
        }
    }
}

/// Source record line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceJson {
    pub file_hash: String,
    #[serde(default)]
    pub filesize: u64,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub zero_count: u64,
    #[serde(default)]
    pub nonprobative_count: u64,
    #[serde(default)]
    pub name_pairs: NamePairs,
}

impl SourceJson {
    pub fn from_entry(entry: &SourceEntry) -> Self {
        let metadata = entry.metadata.clone().unwrap_or_default();
        Self {
            file_hash: to_hex(&entry.file_hash),
            filesize: metadata.filesize,
            file_type: metadata.file_type,
            zero_count: metadata.zero_count,
            nonprobative_count: metadata.nonprobative_count,
            name_pairs: NamePairs(entry.names.clone()),
        }
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            filesize: self.filesize,
            file_type: self.file_type.clone(),
            zero_count: self.zero_count,
            nonprobative_count: self.nonprobative_count,
        }
    }
}

/// The `source_offsets` triples of a resolved hash entry
pub fn source_offsets(entry: &HashEntry) -> SourceOffsetList {
    SourceOffsetList(
        entry
            .sources
            .iter()
            .map(|s| SourceOffsetJson {
                file_hash: to_hex(&s.file_hash),
                count: s.count,
                offsets: s.offsets.clone(),
            })
            .collect(),
    )
}

// =============================================================================
// Import
// =============================================================================

/// Import line-delimited JSON records into `db`.
///
/// Blank and `#` lines are skipped. Any other line that is not a valid
/// hash or source record is counted in `invalid_records` and skipped; only
/// I/O and storage errors stop the import.
pub fn import_json<R: BufRead>(db: &HashDb, reader: R, changes: &mut Changes) -> Result<()> {
    let mut lines = 0u64;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        lines += 1;

        let value = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) if value.is_object() => value,
            Ok(_) => {
                invalid(changes, index + 1, "expected a JSON object");
                continue;
            }
            Err(e) => {
                invalid(changes, index + 1, &e.to_string());
                continue;
            }
        };

        if value.get("file_hash").is_some() {
            match serde_json::from_value::<SourceJson>(value) {
                Ok(record) => import_source_record(db, &record, index + 1, changes)?,
                Err(e) => invalid(changes, index + 1, &e.to_string()),
            }
        } else if value.get("block_hash").is_some() {
            match serde_json::from_value::<HashJson>(value) {
                Ok(record) => import_hash_record(db, &record, index + 1, changes)?,
                Err(e) => invalid(changes, index + 1, &e.to_string()),
            }
        } else {
            invalid(changes, index + 1, "neither a hash nor a source record");
        }
    }
    tracing::debug!(lines, "imported JSON records");
    Ok(())
}

fn import_source_record(
    db: &HashDb,
    record: &SourceJson,
    line: usize,
    changes: &mut Changes,
) -> Result<()> {
    let file_hash = match parse_digest(&record.file_hash) {
        Ok(h) => h,
        Err(e) => {
            invalid(changes, line, &e.to_string());
            return Ok(());
        }
    };
    db.insert_source_data(&file_hash, record.metadata(), changes)?;
    for (repository_name, filename) in &record.name_pairs.0 {
        db.insert_source_name(&file_hash, repository_name, filename, changes)?;
    }
    Ok(())
}

fn import_hash_record(
    db: &HashDb,
    record: &HashJson,
    line: usize,
    changes: &mut Changes,
) -> Result<()> {
    let block_hash = match parse_digest(&record.block_hash) {
        Ok(h) => h,
        Err(e) => {
            invalid(changes, line, &e.to_string());
            return Ok(());
        }
    };
    let meta = HashMeta::new(record.k_entropy, record.block_label.clone());
    for entry in &record.source_offsets.0 {
        let file_hash = match parse_digest(&entry.file_hash) {
            Ok(h) => h,
            Err(e) => {
                invalid(changes, line, &e.to_string());
                continue;
            }
        };
        db.merge_hash(
            &block_hash,
            &file_hash,
            entry.count,
            &entry.offsets,
            &meta,
            changes,
        )?;
    }
    Ok(())
}

fn invalid(changes: &mut Changes, line: usize, reason: &str) {
    tracing::warn!(line, reason, "skipping invalid record");
    changes.invalid_records += 1;
}
