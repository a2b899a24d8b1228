//! Set algebra over databases
//!
//! Every operation reads its inputs read-only and writes `out` through a
//! [`Destination`]. Occurrences are merged, so running an operation twice
//! into the same destination changes nothing the second time.
//!
//! Intersection and difference by source identity work on single
//! occurrences: an occurrence is a (block hash, file hash, offset) triple,
//! and the compacted part of a group (occurrences past
//! `max_id_offset_pairs`, counted but without offsets) is matched by count.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::changes::Changes;
use crate::engine::{HashDb, SourceOffsets};
use crate::error::Result;

use super::adder::{Adder, Names};
use super::{open_input, CountRange, Destination, OrdinalRange};

/// Compacted part of an occurrence group
fn compacted(occurrences: &SourceOffsets) -> u64 {
    occurrences
        .count
        .saturating_sub(occurrences.offsets.len() as u64)
}

fn finish(dest: Destination, changes: Changes, command: String) -> Result<Changes> {
    dest.commit(&command, &changes)?;
    tracing::info!(command = %command, inserted = changes.hashes_inserted, "operation complete");
    Ok(changes)
}

// =============================================================================
// Union
// =============================================================================

/// Union `a` into `b`, creating `b` with `a`'s settings if missing
pub fn add(a: &Path, b: &Path) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(b, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);
    adder.copy_all(&src)?;
    let command = format!("add {} {}", a.display(), b.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Union every input into `out`; `out` takes the first input's settings
pub fn add_multiple(inputs: &[&Path], out: &Path) -> Result<Changes> {
    let dbs = inputs
        .iter()
        .map(|p| open_input(p))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = dbs.first() else {
        return Ok(Changes::default());
    };
    let dest = Destination::open_or_create(out, &first.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);
    for src in &dbs {
        adder.copy_all(src)?;
    }
    let names: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
    let command = format!("add_multiple {} {}", names.join(" "), out.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy sources named in `repository`, with only their names there
pub fn add_repository(a: &Path, out: &Path, repository: &str) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::Only(repository));
    copy_sources_where(&src, &mut adder, |src, fh| {
        src.find_source(fh).is_some_and(|s| s.has_repository(repository))
    })?;
    let command = format!("add_repository {} {} {}", a.display(), out.display(), repository);
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy sources not named in `repository`, dropping their names there
pub fn subtract_repository(a: &Path, out: &Path, repository: &str) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::Except(repository));
    copy_sources_where(&src, &mut adder, |src, fh| {
        src.find_source(fh).is_some_and(|s| !s.has_repository(repository))
    })?;
    let command = format!(
        "subtract_repository {} {} {}",
        a.display(),
        out.display(),
        repository
    );
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy the sources at ordinal positions in `range` of `a`'s source order
pub fn add_range(a: &Path, out: &Path, range: OrdinalRange) -> Result<Changes> {
    let src = open_input(a)?;
    let selected: HashSet<Vec<u8>> = src
        .source_hashes()
        .into_iter()
        .enumerate()
        .filter(|&(i, _)| range.contains(i as u64))
        .map(|(_, fh)| fh)
        .collect();
    tracing::debug!(selected = selected.len(), "sources in range");

    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);
    copy_sources_where(&src, &mut adder, |_, fh| selected.contains(fh))?;
    let command = format!("add_range {} {} {:?}", a.display(), out.display(), range);
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy hashes whose total count falls in `range`
pub fn add_count_range(a: &Path, out: &Path, range: CountRange) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);
    for entry in src.hash_entries() {
        if range.contains(entry.count) {
            adder.copy_entry(&entry, &[&src], |_| true)?;
        }
    }
    let command = format!("add_count_range {} {} {:?}", a.display(), out.display(), range);
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy hashes that occur exactly once
pub fn unique(a: &Path, out: &Path) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);
    for entry in src.hash_entries() {
        if entry.count == 1 {
            adder.copy_entry(&entry, &[&src], |_| true)?;
        }
    }
    let command = format!("unique {} {}", a.display(), out.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy everything, keeping one canonical name per source
pub fn deduplicate(a: &Path, out: &Path) -> Result<Changes> {
    let src = open_input(a)?;
    let dest = Destination::open_or_create(out, &src.settings())?;
    let mut adder = Adder::new(dest.db(), Names::Canonical);
    adder.copy_all(&src)?;
    let command = format!("deduplicate {} {}", a.display(), out.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Copy the sources accepted by `keep` together with their occurrences
fn copy_sources_where(
    src: &HashDb,
    adder: &mut Adder<'_>,
    keep: impl Fn(&HashDb, &[u8]) -> bool,
) -> Result<()> {
    let mut decisions: HashMap<Vec<u8>, bool> = HashMap::new();
    let mut decide = |fh: &[u8]| -> bool {
        if let Some(&d) = decisions.get(fh) {
            return d;
        }
        let d = keep(src, fh);
        decisions.insert(fh.to_vec(), d);
        d
    };
    for entry in src.hash_entries() {
        adder.copy_entry(&entry, &[src], &mut decide)?;
    }
    for file_hash in src.source_hashes() {
        if decide(file_hash.as_slice()) {
            adder.copy_source(&file_hash, &[src])?;
        }
    }
    Ok(())
}

// =============================================================================
// Intersection
// =============================================================================

/// Keep occurrences present in both `a` and `b`
pub fn intersect(a: &Path, b: &Path, out: &Path) -> Result<Changes> {
    let db_a = open_input(a)?;
    let db_b = open_input(b)?;
    let dest = Destination::open_or_create(out, &db_a.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);

    for entry in db_a.hash_entries() {
        let Some(other) = db_b.find_hash(&entry.block_hash) else {
            continue;
        };
        for ours in &entry.sources {
            let Some(theirs) = other.source(&ours.file_hash) else {
                continue;
            };
            let their_offsets: BTreeSet<u64> = theirs.offsets.iter().copied().collect();
            let offsets: Vec<u64> = ours
                .offsets
                .iter()
                .copied()
                .filter(|o| their_offsets.contains(o))
                .collect();
            let count = offsets.len() as u64 + compacted(ours).min(compacted(theirs));
            if count == 0 {
                continue;
            }
            adder.copy_source(&ours.file_hash, &[&db_a, &db_b])?;
            adder.copy_occurrences(
                &entry,
                &SourceOffsets {
                    file_hash: ours.file_hash.clone(),
                    count,
                    offsets,
                },
            )?;
        }
    }
    let command = format!("intersect {} {} {}", a.display(), b.display(), out.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Keep block hashes present in both, with every occurrence from either
pub fn intersect_hash(a: &Path, b: &Path, out: &Path) -> Result<Changes> {
    let db_a = open_input(a)?;
    let db_b = open_input(b)?;
    let dest = Destination::open_or_create(out, &db_a.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);

    let from = [&db_a, &db_b];
    for entry in db_a.hash_entries() {
        let Some(other) = db_b.find_hash(&entry.block_hash) else {
            continue;
        };
        adder.copy_entry(&entry, &from, |_| true)?;
        adder.copy_entry(&other, &from, |_| true)?;
    }
    let command = format!(
        "intersect_hash {} {} {}",
        a.display(),
        b.display(),
        out.display()
    );
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

// =============================================================================
// Difference
// =============================================================================

/// Keep occurrences of `a` that are not in `b`
pub fn subtract(a: &Path, b: &Path, out: &Path) -> Result<Changes> {
    let db_a = open_input(a)?;
    let db_b = open_input(b)?;
    let dest = Destination::open_or_create(out, &db_a.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);

    for entry in db_a.hash_entries() {
        let other = db_b.find_hash(&entry.block_hash);
        for ours in &entry.sources {
            let theirs = other.as_ref().and_then(|o| o.source(&ours.file_hash));
            let (offsets, extra) = match theirs {
                None => (ours.offsets.clone(), compacted(ours)),
                Some(theirs) => {
                    let their_offsets: BTreeSet<u64> = theirs.offsets.iter().copied().collect();
                    let offsets: Vec<u64> = ours
                        .offsets
                        .iter()
                        .copied()
                        .filter(|o| !their_offsets.contains(o))
                        .collect();
                    (offsets, compacted(ours).saturating_sub(compacted(theirs)))
                }
            };
            let count = offsets.len() as u64 + extra;
            if count == 0 {
                continue;
            }
            adder.copy_source(&ours.file_hash, &[&db_a])?;
            adder.copy_occurrences(
                &entry,
                &SourceOffsets {
                    file_hash: ours.file_hash.clone(),
                    count,
                    offsets,
                },
            )?;
        }
    }
    let command = format!("subtract {} {} {}", a.display(), b.display(), out.display());
    let changes = adder.into_changes();
    finish(dest, changes, command)
}

/// Keep block hashes of `a` that `b` does not have at all
pub fn subtract_hash(a: &Path, b: &Path, out: &Path) -> Result<Changes> {
    let db_a = open_input(a)?;
    let db_b = open_input(b)?;
    let dest = Destination::open_or_create(out, &db_a.settings())?;
    let mut adder = Adder::new(dest.db(), Names::All);

    for entry in db_a.hash_entries() {
        if db_b.find_hash_count(&entry.block_hash).is_none() {
            adder.copy_entry(&entry, &[&db_a], |_| true)?;
        }
    }
    let command = format!(
        "subtract_hash {} {} {}",
        a.display(),
        b.display(),
        out.display()
    );
    let changes = adder.into_changes();
    finish(dest, changes, command)
}
