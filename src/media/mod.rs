//! Media Module
//!
//! Resolves forensic paths such as `"600-zip-3"` to bytes: read the media
//! at offset 600, unpack the zip entry found there, then take the bytes at
//! offset 3 of the unpacked data. Steps nest to any depth.

mod container;
mod path;
mod reader;

pub use container::{uncompress_gzip, uncompress_zip, ContainerKind};
pub use path::{ForensicPath, PathStep};
pub use reader::{read_bytes, read_media, MAX_CONTAINER_READ};
