//! Hash Module
//!
//! Block-hash storage: the exact [`HashIndex`] keyed by (possibly truncated)
//! digest, and the [`ApproximateStore`] answering fast upper-bound counts.

mod approximate;
mod index;
mod record;

pub use approximate::ApproximateStore;
pub use index::HashIndex;
pub use record::{HashMeta, HashRecord, SourceOccurrences};
