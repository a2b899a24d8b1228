//! Forensic path parsing
//!
//! ```text
//! path  := offset ( "-" kind "-" offset )*
//! kind  := "zip" | "gzip"
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{HashdbError, Result};

use super::ContainerKind;

/// One container step: unpack `kind`, then move to `offset` inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub kind: ContainerKind,
    pub offset: u64,
}

/// Parsed forensic path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForensicPath {
    /// Offset into the base media
    pub offset: u64,
    pub steps: Vec<PathStep>,
}

impl ForensicPath {
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = text.split('-');
        let offset = parse_offset(tokens.next())
            .ok_or_else(|| HashdbError::ForensicPath(format!("invalid forensic path '{}'", text)))?;

        let mut steps = Vec::new();
        while let Some(kind) = tokens.next() {
            let kind = ContainerKind::from_tag(kind).ok_or_else(|| {
                HashdbError::ForensicPath(
                    "invalid forensic path, compression type expected".into(),
                )
            })?;
            let offset = parse_offset(tokens.next()).ok_or_else(|| {
                HashdbError::ForensicPath(
                    "invalid forensic path, compression offset expected".into(),
                )
            })?;
            steps.push(PathStep { kind, offset });
        }
        Ok(Self { offset, steps })
    }
}

fn parse_offset(token: Option<&str>) -> Option<u64> {
    let token = token?;
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

impl FromStr for ForensicPath {
    type Err = HashdbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ForensicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.offset)?;
        for step in &self.steps {
            write!(f, "-{}-{}", step.kind.tag(), step.offset)?;
        }
        Ok(())
    }
}
