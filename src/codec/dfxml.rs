//! DFXML codec
//!
//! Reads the fileobject/byte_run shape produced by block hashing tools:
//!
//! ```text
//! <fileobject>
//!   <repository_name>repo</repository_name>
//!   <filename>file1</filename>
//!   <filesize>8192</filesize>
//!   <hashdigest type='MD5'>...file digest...</hashdigest>
//!   <byte_run file_offset='0' len='4096'>
//!     <hashdigest type='MD5'>...block digest...</hashdigest>
//!   </byte_run>
//! </fileobject>
//! ```
//!
//! Only byte runs whose `len` equals the database block size are imported.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::mem;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::changes::Changes;
use crate::engine::HashDb;
use crate::error::{HashdbError, Result};
use crate::hash::HashMeta;
use crate::source::SourceMetadata;

use super::{parse_digest, to_hex};

#[derive(Debug, Default)]
struct ByteRun {
    file_offset: Option<u64>,
    len: Option<u64>,
    hashdigest: Option<String>,
}

#[derive(Debug, Default)]
struct FileObject {
    repository_name: Option<String>,
    filename: Option<String>,
    filesize: Option<u64>,
    file_hash: Option<String>,
    byte_runs: Vec<ByteRun>,
}

/// Element whose text is being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RepositoryName,
    Filename,
    Filesize,
    FileDigest,
    RunDigest,
}

/// Parser state across events
#[derive(Default)]
struct DfxmlState {
    fileobject: Option<FileObject>,
    byte_run: Option<ByteRun>,
    field: Option<Field>,
    text: String,
}

/// Import a DFXML document into `db`.
///
/// `repository` names sources whose fileobject carries no
/// `repository_name` element.
pub fn import_dfxml<R: BufRead>(
    db: &HashDb,
    reader: R,
    repository: &str,
    changes: &mut Changes,
) -> Result<()> {
    let block_size = db.settings().block_size;
    let mut reader = Reader::from_reader(reader);
    reader.trim_text(true);

    let mut state = DfxmlState::default();
    let mut fileobjects = 0u64;
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            HashdbError::Dfxml(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Eof => break,
            Event::Start(e) => state.start(&e)?,
            Event::Empty(e) => {
                state.start(&e)?;
                if let Some(done) = state.end(e.local_name().as_ref()) {
                    fileobjects += 1;
                    import_fileobject(db, done, repository, block_size, changes)?;
                }
            }
            Event::Text(t) => {
                if state.field.is_some() {
                    let text = t
                        .unescape()
                        .map_err(|e| HashdbError::Dfxml(e.to_string()))?;
                    state.text.push_str(&text);
                }
            }
            Event::End(e) => {
                if let Some(done) = state.end(e.local_name().as_ref()) {
                    fileobjects += 1;
                    import_fileobject(db, done, repository, block_size, changes)?;
                }
            }
            _ => {}
        }
        buf.clear();
    }
    tracing::debug!(fileobjects, "imported DFXML");
    Ok(())
}

impl DfxmlState {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let Some(fileobject) = self.fileobject.as_mut() else {
            if e.local_name().as_ref() == b"fileobject" {
                self.fileobject = Some(FileObject::default());
            }
            return Ok(());
        };
        self.text.clear();
        self.field = match e.local_name().as_ref() {
            b"repository_name" => Some(Field::RepositoryName),
            b"filename" => Some(Field::Filename),
            b"filesize" => Some(Field::Filesize),
            b"hashdigest" if self.byte_run.is_some() => Some(Field::RunDigest),
            b"hashdigest" if fileobject.file_hash.is_none() => Some(Field::FileDigest),
            b"byte_run" => {
                let mut run = ByteRun::default();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| HashdbError::Dfxml(e.to_string()))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| HashdbError::Dfxml(e.to_string()))?;
                    match attr.key.as_ref() {
                        b"file_offset" => run.file_offset = value.trim().parse().ok(),
                        b"len" => run.len = value.trim().parse().ok(),
                        _ => {}
                    }
                }
                self.byte_run = Some(run);
                None
            }
            _ => None,
        };
        Ok(())
    }

    /// Close an element; returns a finished fileobject
    fn end(&mut self, name: &[u8]) -> Option<FileObject> {
        let text = mem::take(&mut self.text);
        let field = self.field.take();
        let fileobject = self.fileobject.as_mut()?;
        match (name, field) {
            (b"fileobject", _) => {
                self.byte_run = None;
                return self.fileobject.take();
            }
            (b"byte_run", _) => {
                if let Some(run) = self.byte_run.take() {
                    fileobject.byte_runs.push(run);
                }
            }
            (_, Some(Field::RepositoryName)) => fileobject.repository_name = Some(text),
            (_, Some(Field::Filename)) => fileobject.filename = Some(text),
            (_, Some(Field::Filesize)) => fileobject.filesize = text.trim().parse().ok(),
            (_, Some(Field::FileDigest)) => fileobject.file_hash = Some(text),
            (_, Some(Field::RunDigest)) => {
                if let Some(run) = self.byte_run.as_mut() {
                    run.hashdigest = Some(text);
                }
            }
            _ => {}
        }
        None
    }
}

fn import_fileobject(
    db: &HashDb,
    fileobject: FileObject,
    default_repository: &str,
    block_size: u64,
    changes: &mut Changes,
) -> Result<()> {
    let file_hash = match fileobject.file_hash.as_deref().map(parse_digest) {
        Some(Ok(h)) => h,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "invalid fileobject digest");
            changes.invalid_records += 1;
            return Ok(());
        }
        None => {
            tracing::warn!(filename = ?fileobject.filename, "fileobject without a file digest");
            changes.invalid_records += 1;
            return Ok(());
        }
    };

    let repository = fileobject
        .repository_name
        .as_deref()
        .unwrap_or(default_repository);
    let filename = fileobject.filename.as_deref().unwrap_or("");
    db.insert_source_name(&file_hash, repository, filename, changes)?;
    if let Some(filesize) = fileobject.filesize {
        let metadata = SourceMetadata {
            filesize,
            ..SourceMetadata::default()
        };
        db.insert_source_data(&file_hash, metadata, changes)?;
    }

    let meta = HashMeta::default();
    for run in &fileobject.byte_runs {
        let (Some(offset), Some(len), Some(digest)) = (run.file_offset, run.len, &run.hashdigest)
        else {
            continue;
        };
        if len != block_size {
            continue;
        }
        match parse_digest(digest.trim()) {
            Ok(block_hash) => {
                db.insert_hash(&block_hash, &file_hash, offset, &meta, changes)?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid byte_run digest");
                changes.invalid_records += 1;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Export
// =============================================================================

/// Digest type name guessed from its length
fn digest_type(digest: &[u8]) -> &'static str {
    match digest.len() {
        16 => "MD5",
        20 => "SHA1",
        32 => "SHA256",
        _ => "UNKNOWN",
    }
}

/// Export `db` as DFXML.
///
/// One fileobject per provenance pair; byte runs go on the first one, so
/// importing the output restores names and stored offsets. Compacted
/// occurrences have no offset and are not written.
pub fn export_dfxml<W: Write>(db: &HashDb, out: &mut W) -> Result<u64> {
    let block_size = db.settings().block_size;

    // file hash → (offset, block hash)
    let mut runs: BTreeMap<Vec<u8>, Vec<(u64, Vec<u8>)>> = BTreeMap::new();
    for entry in db.hash_entries() {
        for source in &entry.sources {
            let list = runs.entry(source.file_hash.clone()).or_default();
            list.extend(source.offsets.iter().map(|&o| (o, entry.block_hash.clone())));
        }
    }

    writeln!(out, "<?xml version='1.0' encoding='UTF-8'?>")?;
    writeln!(out, "<dfxml xmloutputversion='1.0'>")?;
    let mut fileobjects = 0u64;
    for file_hash in db.source_hashes() {
        let Some(source) = db.find_source(&file_hash) else {
            continue;
        };
        let mut source_runs = runs.remove(&file_hash).unwrap_or_default();
        source_runs.sort();

        let names = if source.names.is_empty() {
            vec![(String::new(), String::new())]
        } else {
            source.names.clone()
        };
        for (i, (repository_name, filename)) in names.iter().enumerate() {
            writeln!(out, "  <fileobject>")?;
            writeln!(
                out,
                "    <repository_name>{}</repository_name>",
                escape(repository_name.as_str())
            )?;
            writeln!(out, "    <filename>{}</filename>", escape(filename.as_str()))?;
            writeln!(out, "    <filesize>{}</filesize>", source.metadata.as_ref().map_or(0, |m| m.filesize))?;
            writeln!(
                out,
                "    <hashdigest type='{}'>{}</hashdigest>",
                digest_type(&file_hash),
                to_hex(&file_hash)
            )?;
            if i == 0 {
                for (offset, block_hash) in &source_runs {
                    writeln!(
                        out,
                        "    <byte_run file_offset='{}' len='{}'>",
                        offset, block_size
                    )?;
                    writeln!(
                        out,
                        "      <hashdigest type='{}'>{}</hashdigest>",
                        digest_type(block_hash),
                        to_hex(block_hash)
                    )?;
                    writeln!(out, "    </byte_run>")?;
                }
            }
            writeln!(out, "  </fileobject>")?;
            fileobjects += 1;
        }
    }
    writeln!(out, "</dfxml>")?;
    out.flush()?;
    Ok(fileobjects)
}
