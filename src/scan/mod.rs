//! Scan Module
//!
//! Resolves queried block digests against a database.
//!
//! - [`ScanMode`]: the four verbosity levels
//! - [`ScanManager`]: one scan session, with the caches that let
//!   EXPANDED_OPTIMIZED elide repeats
//! - [`ScanStream`]: binary records in, binary records out, resolved by a
//!   single worker thread in arrival order

mod manager;
mod mode;
mod stream;

pub use manager::{scan_list, ExpandedMatch, ScanListSummary, ScanManager, ScanResult};
pub use mode::ScanMode;
pub use stream::{decode_responses, ScanStream, StreamResponse, RESPONSE_HEADER_SIZE};
