//! Media reads at forensic paths

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

use super::ForensicPath;

/// Bytes read from the media at the outer offset when a container follows
pub const MAX_CONTAINER_READ: u64 = 1024 * 1024;

/// Read up to `count` bytes of the media at `offset`; past the end is empty
pub fn read_media(media: &Path, offset: u64, count: u64) -> Result<Vec<u8>> {
    let mut file = File::open(media)?;
    let size = file.metadata()?.len();
    if offset >= size {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.take(count.min(size - offset)).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read up to `count` bytes at a forensic path.
///
/// Reading past the end of the data at any level gives an empty result.
/// A container region too small for its header is an error.
pub fn read_bytes(media: &Path, path: &str, count: u64) -> Result<Vec<u8>> {
    let path = ForensicPath::parse(path)?;
    if path.steps.is_empty() {
        return read_media(media, path.offset, count);
    }

    let mut data = read_media(media, path.offset, MAX_CONTAINER_READ.max(count))?;
    for step in &path.steps {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let unpacked = step.kind.uncompress(&data)?;
        let offset = step.offset as usize;
        if step.offset >= unpacked.len() as u64 {
            return Ok(Vec::new());
        }
        data = unpacked[offset..].to_vec();
    }
    data.truncate(count.min(data.len() as u64) as usize);
    Ok(data)
}
