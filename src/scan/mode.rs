//! Scan verbosity

use std::fmt;
use std::str::FromStr;

use crate::error::HashdbError;

/// How much a scan reports about each match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// Hash data, every source record, every occurrence
    Expanded,
    /// Like `Expanded`, but each hash, source list and source is reported
    /// in full only once per session
    ExpandedOptimized,
    /// Exact occurrence count only
    Count,
    /// Fast upper-bound count from the Bloom filter and approximate store
    ApproximateCount,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Expanded => "expanded",
            ScanMode::ExpandedOptimized => "expanded_optimized",
            ScanMode::Count => "count",
            ScanMode::ApproximateCount => "approximate_count",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = HashdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "e" | "expanded" => Ok(ScanMode::Expanded),
            "o" | "expanded_optimized" => Ok(ScanMode::ExpandedOptimized),
            "c" | "count" => Ok(ScanMode::Count),
            "a" | "approximate_count" => Ok(ScanMode::ApproximateCount),
            other => Err(HashdbError::Settings(format!("unknown scan mode '{}'", other))),
        }
    }
}
