//! Operation log
//!
//! Each database directory keeps `log.txt`, an append-only record of the
//! operations run against it:
//!
//! ```text
//! # command: import db1 sample.json
//! # hashdb-Version: 0.1.0
//! {"name":"begin import","delta":0.000001,"total":0.000001}
//! {"name":"end import","delta":0.812334,"total":0.812335}
//! {"changes":{"hashes_inserted":2048,...}}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::changes::Changes;
use crate::error::Result;

/// Name of the log file inside a database directory
pub const LOG_FILENAME: &str = "log.txt";

/// One timestamp event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestampEvent {
    pub name: String,
    /// Seconds since the previous event
    pub delta: f64,
    /// Seconds since the timer started
    pub total: f64,
}

/// Wall-clock timer producing named events
#[derive(Debug)]
pub struct Timestamp {
    start: Instant,
    last: Instant,
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::new()
    }
}

impl Timestamp {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }

    /// Take a named timestamp
    pub fn stamp(&mut self, name: &str) -> TimestampEvent {
        let now = Instant::now();
        let event = TimestampEvent {
            name: name.to_string(),
            delta: now.duration_since(self.last).as_secs_f64(),
            total: now.duration_since(self.start).as_secs_f64(),
        };
        self.last = now;
        event
    }
}

#[derive(Serialize)]
struct ChangesLine<'a> {
    changes: &'a Changes,
}

/// Appender for a database's `log.txt`
pub struct OperationLog {
    writer: BufWriter<File>,
    timestamp: Timestamp,
}

impl OperationLog {
    /// Open the log of database `dir` and write the command header
    pub fn open(dir: &Path, command: &str) -> Result<Self> {
        Self::with_timestamp(dir, command, Timestamp::new())
    }

    /// Like [`open`](Self::open), but keep timing with a timer started
    /// when the operation began
    pub fn with_timestamp(dir: &Path, command: &str, timestamp: Timestamp) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILENAME))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# command: {}", command)?;
        writeln!(writer, "# hashdb-Version: {}", crate::VERSION)?;
        Ok(Self { writer, timestamp })
    }

    /// Append a timestamp event
    pub fn add_timestamp(&mut self, name: &str) -> Result<TimestampEvent> {
        let event = self.timestamp.stamp(name);
        self.add_event(&event)?;
        Ok(event)
    }

    /// Append an event stamped earlier
    pub fn add_event(&mut self, event: &TimestampEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        writeln!(self.writer)?;
        tracing::debug!(
            name = %event.name,
            delta = event.delta,
            total = event.total,
            "timestamp"
        );
        Ok(())
    }

    /// Append the change tally of the operation
    pub fn add_changes(&mut self, changes: &Changes) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &ChangesLine { changes })?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Flush buffered lines to disk
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
