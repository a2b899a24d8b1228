//! Tab-delimited import
//!
//! Each line is `<file_hash>\t<block_hash>\t<block_index>`; the byte
//! offset is `block_index * block_size`. `#` lines are comments.
//!
//! Sources that were already in the database before the import began are
//! skipped entirely, so re-importing a tab file adds nothing. Each new
//! source is named `(repository, tab file name)`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::changes::Changes;
use crate::engine::HashDb;
use crate::error::Result;
use crate::hash::HashMeta;

use super::parse_digest;

/// Label given to hashes found in the whitelist database
pub const WHITELIST_LABEL: &str = "w";

/// Import a tab file into `db`.
///
/// `repository` defaults to the tab file name. When `whitelist` is given,
/// block hashes present in it are labelled [`WHITELIST_LABEL`].
pub fn import_tab(
    db: &HashDb,
    path: &Path,
    repository: Option<&str>,
    whitelist: Option<&HashDb>,
    changes: &mut Changes,
) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let repository = repository.unwrap_or(&filename).to_string();
    let reader = BufReader::new(File::open(path)?);
    import_tab_lines(db, reader, &repository, &filename, whitelist, changes)
}

/// Import tab lines from any reader, naming new sources `(repository, filename)`
pub fn import_tab_lines<R: BufRead>(
    db: &HashDb,
    reader: R,
    repository: &str,
    filename: &str,
    whitelist: Option<&HashDb>,
    changes: &mut Changes,
) -> Result<()> {
    let block_size = db.settings().block_size;
    // file hash → true when it predates this import
    let mut preexisting: HashMap<Vec<u8>, bool> = HashMap::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            tracing::warn!(line = index + 1, "tab line must have three fields");
            changes.invalid_records += 1;
            continue;
        }
        let (file_hash, block_hash) = match (parse_digest(fields[0]), parse_digest(fields[1])) {
            (Ok(f), Ok(b)) => (f, b),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(line = index + 1, error = %e, "invalid digest in tab line");
                changes.invalid_records += 1;
                continue;
            }
        };
        let block_index: u64 = match fields[2].trim().parse() {
            Ok(i) => i,
            Err(_) => {
                tracing::warn!(line = index + 1, "invalid block index in tab line");
                changes.invalid_records += 1;
                continue;
            }
        };

        let skip = match preexisting.get(&file_hash) {
            Some(&skip) => skip,
            None => {
                let skip = db.has_source(&file_hash);
                if !skip {
                    db.insert_source_name(&file_hash, repository, filename, changes)?;
                }
                preexisting.insert(file_hash.clone(), skip);
                skip
            }
        };
        if skip {
            continue;
        }

        let label = match whitelist {
            Some(w) if w.find_hash_count(&block_hash).is_some() => WHITELIST_LABEL,
            _ => "",
        };
        db.insert_hash(
            &block_hash,
            &file_hash,
            block_index * block_size,
            &HashMeta::new(0, label),
            changes,
        )?;
    }
    Ok(())
}
