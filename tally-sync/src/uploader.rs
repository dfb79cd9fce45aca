//! Throttled batch upload of unique records.
//!
//! Records are partitioned into consecutive batches of at most
//! `batch_size`, in order. Each batch is one `POST {endpoint}/bulk` whose
//! body is newline-delimited JSON, one object per record. A fixed delay is
//! observed between consecutive batch requests. A rejected batch does not
//! stop the run; a transport failure skips every remaining batch.

use std::time::Duration;

use serde::Deserialize;

use tally_core::{Record, RecordSet, UploadMode};

use crate::error::HttpError;
use crate::session::Session;
use crate::transport::Method;

/// The only status that accepts a bulk batch.
const BULK_OK: u16 = 200;

/// Pause between batches. Swapped out in tests to observe the delays.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    /// The remote answered with a success status. `accepted[i]` tells
    /// whether the `i`-th record of the batch was stored.
    Accepted {
        status: u16,
        body: String,
        accepted: Vec<bool>,
    },
    /// The remote answered with a non-success status.
    Rejected { status: u16, body: String },
    /// No response was received.
    Failed(HttpError),
    /// Not attempted after an earlier transport failure.
    Skipped,
    /// Dry run: nothing was sent.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// 1-based batch number.
    pub batch: usize,
    /// Index of the batch's first record in the uploaded set.
    pub offset: usize,
    pub len: usize,
    pub result: BatchResult,
}

impl UploadOutcome {
    pub fn status(&self) -> Option<u16> {
        match &self.result {
            BatchResult::Accepted { status, .. } | BatchResult::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, BatchResult::Accepted { .. })
    }

    /// Indices, into the uploaded set, of records the remote stored.
    pub fn accepted_indices(&self) -> Vec<usize> {
        match &self.result {
            BatchResult::Accepted { accepted, .. } => accepted
                .iter()
                .enumerate()
                .filter(|(_, ok)| **ok)
                .map(|(i, _)| self.offset + i)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn accepted_count(&self) -> usize {
        match &self.result {
            BatchResult::Accepted { accepted, .. } => accepted.iter().filter(|ok| **ok).count(),
            _ => 0,
        }
    }
}

/// Consecutive slices of at most `batch_size` records.
pub fn partition(records: &[Record], batch_size: usize) -> std::slice::Chunks<'_, Record> {
    records.chunks(batch_size.max(1))
}

/// One JSON object per line, no trailing newline.
pub fn encode_batch(batch: &[Record]) -> String {
    batch
        .iter()
        .map(|r| r.to_json().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line of a bulk response: `{"status":"success","id":"..."}`.
#[derive(Deserialize)]
struct BulkLine {
    status: String,
}

/// Per-record acceptance from a successful bulk response.
///
/// When the body has one parseable status line per record, each line
/// decides; otherwise the success status covers the whole batch.
fn bulk_acceptance(body: &str, len: usize) -> Vec<bool> {
    let lines: Vec<BulkLine> = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    if lines.len() == len {
        lines.iter().map(|l| l.status == "success").collect()
    } else {
        vec![true; len]
    }
}

pub struct BatchUploader<'a> {
    session: &'a Session<'a>,
    batch_size: usize,
    delay: Duration,
    mode: UploadMode,
    sleeper: &'a dyn Sleeper,
    dry_run: bool,
}

impl<'a> BatchUploader<'a> {
    pub fn new(session: &'a Session<'a>, batch_size: usize, delay: Duration, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            session,
            batch_size: batch_size.max(1),
            delay,
            mode: UploadMode::default(),
            sleeper,
            dry_run: false,
        }
    }

    pub fn mode(mut self, mode: UploadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Upload `records` in order; one outcome per batch.
    pub fn upload(&self, endpoint: &str, records: &RecordSet) -> Vec<UploadOutcome> {
        let batches: Vec<&[Record]> = partition(records.records(), self.batch_size).collect();
        let total = batches.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut offset = 0;
        let mut halted = false;

        for (i, batch) in batches.into_iter().enumerate() {
            let number = i + 1;
            let result = if halted {
                BatchResult::Skipped
            } else if self.dry_run {
                tracing::info!("[dry-run] would upload batch {number}/{total} ({} record(s))", batch.len());
                BatchResult::DryRun
            } else {
                if i > 0 && !self.delay.is_zero() {
                    self.sleeper.sleep(self.delay);
                }
                let result = match self.mode {
                    UploadMode::Bulk => self.send_bulk(endpoint, batch),
                    UploadMode::PerRecord => self.send_each(endpoint, batch),
                };
                log_batch(number, total, &result);
                halted = matches!(result, BatchResult::Failed(_));
                result
            };
            outcomes.push(UploadOutcome {
                batch: number,
                offset,
                len: batch.len(),
                result,
            });
            offset += batch.len();
        }
        outcomes
    }

    fn send_bulk(&self, endpoint: &str, batch: &[Record]) -> BatchResult {
        let url = format!("{}/bulk", endpoint.trim_end_matches('/'));
        match self.session.post_text(&url, encode_batch(batch)) {
            Ok(resp) if resp.status == BULK_OK => BatchResult::Accepted {
                accepted: bulk_acceptance(&resp.body, batch.len()),
                status: resp.status,
                body: resp.body,
            },
            Ok(resp) => BatchResult::Rejected {
                status: resp.status,
                body: resp.body,
            },
            Err(err) => BatchResult::Failed(err),
        }
    }

    fn send_each(&self, endpoint: &str, batch: &[Record]) -> BatchResult {
        let mut accepted = Vec::with_capacity(batch.len());
        let mut bodies = Vec::with_capacity(batch.len());
        let mut last_status = 0;
        for record in batch {
            match self.session.send_json(Method::Post, endpoint, &record.to_json()) {
                Ok(resp) => {
                    if !resp.is_success() {
                        tracing::warn!("record rejected with HTTP {}: {}", resp.status, resp.body);
                    }
                    accepted.push(resp.is_success());
                    last_status = resp.status;
                    bodies.push(resp.body);
                }
                // Records already stored stay stored; the batch still fails.
                Err(err) => return BatchResult::Failed(err),
            }
        }
        let body = bodies.join("\n");
        if accepted.iter().any(|ok| *ok) {
            BatchResult::Accepted {
                status: last_status,
                body,
                accepted,
            }
        } else {
            BatchResult::Rejected {
                status: last_status,
                body,
            }
        }
    }
}

fn log_batch(number: usize, total: usize, result: &BatchResult) {
    match result {
        BatchResult::Accepted { status, accepted, .. } => {
            let stored = accepted.iter().filter(|ok| **ok).count();
            tracing::info!("batch {number}/{total}: HTTP {status}, {stored}/{} stored", accepted.len());
        }
        BatchResult::Rejected { status, body } => {
            tracing::error!("batch {number}/{total} rejected with HTTP {status}: {body}");
        }
        BatchResult::Failed(err) => {
            tracing::error!("batch {number}/{total} failed: {err}; remaining batches skipped");
        }
        BatchResult::Skipped | BatchResult::DryRun => {}
    }
}
