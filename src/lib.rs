//! # hashdb
//!
//! A block-hash database for forensic content matching:
//! - Hash index mapping block digests to (source, offset) occurrences
//! - Source catalog with provenance names and file metadata
//! - Bloom accelerator and approximate counts for fast negative answers
//! - JSON, tab and DFXML import/export
//! - Scanning with four result modes and a streaming binary protocol
//! - Set algebra between whole databases
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │   codec (import /    │   │  scan (ScanManager,  │   │ ops (add,    │
//! │   export: JSON, tab, │   │  ScanStream)         │   │ intersect,   │
//! │   DFXML)             │   │                      │   │ subtract...) │
//! └──────────┬───────────┘   └──────────┬───────────┘   └──────┬───────┘
//!            │                          │                      │
//! ┌──────────▼──────────────────────────▼──────────────────────▼───────┐
//! │                           HashDb (engine)                           │
//! │                   (Single Writer / Multi Reader)                    │
//! └───────┬───────────────┬────────────────┬────────────────┬──────────┘
//!         │               │                │                │
//!         ▼               ▼                ▼                ▼
//!   ┌───────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐
//!   │ HashIndex │  │ Approximate │  │   Source    │  │    Bloom    │
//!   │           │  │    Store    │  │   Catalog   │  │   Filter    │
//!   └─────┬─────┘  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘
//!         └───────────────┴────────┬───────┴────────────────┘
//!                                  ▼
//!                          ┌──────────────┐
//!                          │ Record files │
//!                          │   (store)    │
//!                          └──────────────┘
//! ```
//!
//! The forensic path resolver (`media`) stands apart: it reads bytes out of
//! media images through nested zip/gzip containers.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod changes;
pub mod logger;

pub mod store;
pub mod hash;
pub mod source;
pub mod bloom;
pub mod engine;

pub mod codec;
pub mod scan;
pub mod ops;
pub mod media;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HashdbError, Result};
pub use config::{Settings, SettingsBuilder};
pub use changes::Changes;
pub use engine::{HashDb, OpenMode};
pub use scan::{ScanManager, ScanMode};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hashdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
