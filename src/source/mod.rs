//! Source Module
//!
//! The catalog of whole-file sources: digest ↔ numeric id, file metadata,
//! and the (repository, filename) provenance pairs each file was seen under.

mod catalog;

pub use catalog::{SourceCatalog, SourceMetadata};
