//! Streaming scan protocol
//!
//! Bulk scanning over fixed-width binary queries.
//!
//! ## Wire Format
//!
//! ### Query Record
//! ```text
//! ┌────────────────────┬─────────────────────┐
//! │ Digest (hash_size) │ Label (label_size)  │
//! └────────────────────┴─────────────────────┘
//! ```
//!
//! ### Response Record (matches only)
//! ```text
//! ┌────────────┬────────────────────┬─────────────────────┬──────────┐
//! │ Len (8 LE) │ Digest (hash_size) │ Label (label_size)  │   JSON   │
//! └────────────┴────────────────────┴─────────────────────┴──────────┘
//! ```
//! `Len` counts digest + label + JSON bytes.
//!
//! Each `put()` is one batch. A single worker resolves batches in arrival
//! order and emits one response buffer per batch that had matches, so
//! responses never overtake each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{BufMut, Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{HashdbError, Result};

use super::{ScanManager, ScanMode};

/// Size of the length prefix of a response record
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Streaming front end of a [`ScanManager`]
pub struct ScanStream {
    /// `None` once `finish()` has been called
    input: Option<Sender<Bytes>>,
    output: Receiver<Bytes>,
    /// Batches accepted but not yet fully resolved
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
    record_size: usize,
}

impl ScanStream {
    /// Start a stream and its worker thread
    pub fn new(
        manager: Arc<ScanManager>,
        hash_size: usize,
        label_size: usize,
        mode: ScanMode,
    ) -> Result<Self> {
        if hash_size == 0 {
            return Err(HashdbError::Stream("hash size must be at least 1".into()));
        }
        let (input_tx, input_rx) = channel::unbounded::<Bytes>();
        let (output_tx, output_rx) = channel::unbounded::<Bytes>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("hashdb-scan-stream".into())
            .spawn(move || {
                run_worker(
                    &manager,
                    input_rx,
                    output_tx,
                    &worker_pending,
                    hash_size,
                    label_size,
                    mode,
                )
            })?;

        Ok(Self {
            input: Some(input_tx),
            output: output_rx,
            pending,
            worker: Some(worker),
            record_size: hash_size + label_size,
        })
    }

    /// Queue a batch of query records.
    ///
    /// A trailing partial record is dropped with a warning.
    pub fn put(&self, data: &[u8]) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| HashdbError::Stream("put called after finish".into()))?;

        let whole = data.len() / self.record_size * self.record_size;
        if whole != data.len() {
            tracing::warn!(
                dropped = data.len() - whole,
                record_size = self.record_size,
                "dropping partial scan record"
            );
        }
        if whole == 0 {
            return Ok(());
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        input
            .send(Bytes::copy_from_slice(&data[..whole]))
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                HashdbError::Stream("scan worker stopped".into())
            })
    }

    /// Next response buffer, or `None` if nothing is ready yet
    pub fn get(&self) -> Option<Bytes> {
        self.output.try_recv().ok()
    }

    /// True when no batch is in flight and every response has been taken
    pub fn empty(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.output.is_empty()
    }

    /// Stop accepting input and wait for the worker to drain the queue
    pub fn finish(&mut self) {
        self.input = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("scan stream worker panicked");
            }
        }
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.finish();
    }
}

fn run_worker(
    manager: &ScanManager,
    input: Receiver<Bytes>,
    output: Sender<Bytes>,
    pending: &AtomicUsize,
    hash_size: usize,
    label_size: usize,
    mode: ScanMode,
) {
    let record_size = hash_size + label_size;
    for batch in input.iter() {
        let mut response = BytesMut::new();
        for record in batch.chunks_exact(record_size) {
            let (digest, label) = record.split_at(hash_size);
            let json = match manager.scan(digest, mode).to_json() {
                Ok(Some(json)) => json,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode scan response");
                    continue;
                }
            };
            response.put_u64_le((record_size + json.len()) as u64);
            response.put_slice(digest);
            response.put_slice(label);
            response.put_slice(json.as_bytes());
        }
        if !response.is_empty() && output.send(response.freeze()).is_err() {
            pending.fetch_sub(1, Ordering::SeqCst);
            break;
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!("scan stream worker finished");
}

// =============================================================================
// Response Decoding
// =============================================================================

/// One decoded response record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResponse {
    pub digest: Vec<u8>,
    pub label: Vec<u8>,
    pub json: String,
}

/// Split a response buffer into records
pub fn decode_responses(
    mut data: &[u8],
    hash_size: usize,
    label_size: usize,
) -> Result<Vec<StreamResponse>> {
    let mut responses = Vec::new();
    while !data.is_empty() {
        if data.len() < RESPONSE_HEADER_SIZE {
            return Err(HashdbError::Stream(format!(
                "incomplete response header: {} bytes",
                data.len()
            )));
        }
        let mut len_bytes = [0u8; RESPONSE_HEADER_SIZE];
        len_bytes.copy_from_slice(&data[..RESPONSE_HEADER_SIZE]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        data = &data[RESPONSE_HEADER_SIZE..];

        if len < hash_size + label_size || data.len() < len {
            return Err(HashdbError::Stream(format!(
                "invalid response length {} with {} bytes remaining",
                len,
                data.len()
            )));
        }
        let (record, rest) = data.split_at(len);
        let json = String::from_utf8(record[hash_size + label_size..].to_vec())
            .map_err(|e| HashdbError::Stream(format!("response is not UTF-8: {}", e)))?;
        responses.push(StreamResponse {
            digest: record[..hash_size].to_vec(),
            label: record[hash_size..hash_size + label_size].to_vec(),
            json,
        });
        data = rest;
    }
    Ok(responses)
}
