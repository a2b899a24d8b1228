//! Error types for hashdb
//!
//! Fatal, operation-level failures. Per-record validation outcomes
//! (alignment, capacity, collisions) are not errors; they are counted in
//! [`Changes`](crate::changes::Changes).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using HashdbError
pub type Result<T> = std::result::Result<T, HashdbError>;

/// Unified error type for hashdb operations
#[derive(Debug, Error)]
pub enum HashdbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Database Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Database already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Database is open read-only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt store {}: {1}", .0.display())]
    CorruptStore(PathBuf, String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DFXML error: {0}")]
    Dfxml(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Settings error: {0}")]
    Settings(String),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    InvalidHex(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    // -------------------------------------------------------------------------
    // Media Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    ForensicPath(String),

    #[error("{0}")]
    Container(String),

    // -------------------------------------------------------------------------
    // Streaming Errors
    // -------------------------------------------------------------------------
    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<bincode::Error> for HashdbError {
    fn from(e: bincode::Error) -> Self {
        HashdbError::Serialization(e.to_string())
    }
}
