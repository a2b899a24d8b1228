//! Container unpacking
//!
//! Each unpacker takes the region of data starting at the container and
//! returns the unpacked member. Truncated compressed streams yield what
//! could be recovered; a stream yielding nothing is an error.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder};

use crate::error::{HashdbError, Result};

/// Fixed part of a zip local file header
const ZIP_HEADER_SIZE: usize = 30;
const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
const ZIP_MAX_NAME_LEN: usize = 1024;
const ZIP_MIN_UNCOMPRESSED: u64 = 6;

/// Smallest region that can hold a gzip header and trailer
const GZIP_MIN_REGION: usize = 18;

/// Upper bound on unpacked output, guards against compression bombs
const MAX_UNCOMPRESSED: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    Gzip,
}

impl ContainerKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "zip" => Some(ContainerKind::Zip),
            "gzip" => Some(ContainerKind::Gzip),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ContainerKind::Zip => "zip",
            ContainerKind::Gzip => "gzip",
        }
    }

    pub fn uncompress(self, region: &[u8]) -> Result<Vec<u8>> {
        match self {
            ContainerKind::Zip => uncompress_zip(region),
            ContainerKind::Gzip => uncompress_gzip(region),
        }
    }
}

fn le16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Unpack the zip entry whose local header starts at `region[0]`
pub fn uncompress_zip(region: &[u8]) -> Result<Vec<u8>> {
    if region.len() < ZIP_HEADER_SIZE {
        return Err(HashdbError::Container("zip region too small".into()));
    }
    if &region[0..4] != ZIP_SIGNATURE {
        return Err(HashdbError::Container("invalid zip metadata".into()));
    }

    let method = le16(region, 8);
    let compressed_size = le32(region, 18) as usize;
    let uncompressed_size = le32(region, 22) as u64;
    let name_len = le16(region, 26) as usize;
    let extra_len = le16(region, 28) as usize;

    if name_len == 0 || name_len > ZIP_MAX_NAME_LEN {
        return Err(HashdbError::Container("invalid zip metadata".into()));
    }

    let start = ZIP_HEADER_SIZE + name_len + extra_len;
    if start >= region.len() {
        return Err(HashdbError::Container(
            "zip read request outside data range".into(),
        ));
    }
    // A zero size means the sizes follow the data; read what the region has
    let end = match compressed_size {
        0 => region.len(),
        n => (start + n).min(region.len()),
    };
    if uncompressed_size < ZIP_MIN_UNCOMPRESSED {
        return Err(HashdbError::Container("zip uncompress size too small".into()));
    }
    let data = &region[start..end];

    match method {
        0 => Ok(data[..data.len().min(uncompressed_size as usize)].to_vec()),
        8 => inflate(
            DeflateDecoder::new(data),
            uncompressed_size.min(MAX_UNCOMPRESSED),
            "zip",
        ),
        other => Err(HashdbError::Container(format!(
            "unsupported zip compression method {}",
            other
        ))),
    }
}

/// Unpack the gzip stream starting at `region[0]`
pub fn uncompress_gzip(region: &[u8]) -> Result<Vec<u8>> {
    if region.len() < GZIP_MIN_REGION {
        return Err(HashdbError::Container("gzip region too small".into()));
    }
    inflate(GzDecoder::new(region), MAX_UNCOMPRESSED, "gzip")
}

/// Read up to `limit` bytes, keeping partial output from a truncated stream
fn inflate<R: Read>(decoder: R, limit: u64, kind: &str) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match decoder.take(limit).read_to_end(&mut output) {
        Ok(_) => Ok(output),
        Err(e) if !output.is_empty() => {
            tracing::debug!(kind, error = %e, recovered = output.len(), "truncated stream");
            Ok(output)
        }
        Err(e) => Err(HashdbError::Container(format!("{} uncompress failed: {}", kind, e))),
    }
}
