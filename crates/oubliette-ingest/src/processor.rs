//! Single-file ingestion pipeline.
//!
//! Ties the per-line stages together for one input file:
//! parse → normalize → hash → classify → route to shard.
//!
//! Per-line failures are counted and never fatal; only I/O errors on the
//! source itself propagate (the orchestrator then leaves the file
//! non-`done` so a later run retries it).

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use oubliette_core::email::EmailHasher;
use oubliette_core::parse::{LineOutcome, LineParser, SkipReason};
use oubliette_core::record::ShardRecord;
use oubliette_core::{classify, normalize_email};

use crate::audit::AuditLog;
use crate::error::Result;
use crate::streams::ShardStreams;

/// Read buffer for sequential source scans.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Per-file outcome counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileCounters {
    pub accepted: u64,
    pub skipped_empty: u64,
    pub skipped_field_count: u64,
    pub skipped_oversize: u64,
    pub skipped_no_email: u64,
}

impl FileCounters {
    pub fn skipped_total(&self) -> u64 {
        self.skipped_empty + self.skipped_field_count + self.skipped_oversize + self.skipped_no_email
    }

    /// Merge another file's counters into this one.
    pub fn merge(&mut self, other: &FileCounters) {
        self.accepted += other.accepted;
        self.skipped_empty += other.skipped_empty;
        self.skipped_field_count += other.skipped_field_count;
        self.skipped_oversize += other.skipped_oversize;
        self.skipped_no_email += other.skipped_no_email;
    }
}

/// Behavior switches for the processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorOptions {
    /// Emit `email: ""` instead of the normalized email.
    pub scrub_email: bool,
    /// Skip the first line of every input unconditionally.
    pub skip_header: bool,
    /// Reject multi-field lines instead of salvaging the first two fields.
    pub reject_multi_field: bool,
}

/// Runs the per-file pipeline against the shared stream cache.
pub struct FileProcessor {
    hasher: EmailHasher,
    streams: Arc<ShardStreams>,
    audit: Arc<AuditLog>,
    options: ProcessorOptions,
}

impl FileProcessor {
    pub fn new(
        hasher: EmailHasher,
        streams: Arc<ShardStreams>,
        audit: Arc<AuditLog>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            hasher,
            streams,
            audit,
            options,
        }
    }

    /// Process one input file to completion.
    ///
    /// Lines are read raw and decoded lossily; dumps are only nominally
    /// UTF-8 and a mojibake line must not abort the file.
    pub async fn process(&self, source: &Path) -> Result<FileCounters> {
        let source_str = source.to_string_lossy().into_owned();
        let parser = LineParser::new(source_str.len(), self.options.reject_multi_field);

        let file = File::open(source).await?;
        let mut reader = BufReader::with_capacity(READ_BUF_SIZE, file);

        let mut counters = FileCounters::default();
        let mut raw = Vec::with_capacity(512);
        let mut audited_multi_field = false;
        let mut line_no = 0u64;

        loop {
            raw.clear();
            let n = reader.read_until(b'\n', &mut raw).await?;
            if n == 0 {
                break;
            }
            line_no += 1;
            if line_no == 1 && self.options.skip_header {
                continue;
            }

            let text = String::from_utf8_lossy(&raw);
            let parsed = match parser.parse(&text) {
                LineOutcome::Record(parsed) => parsed,
                LineOutcome::Skip {
                    reason,
                    multi_field,
                } => {
                    if multi_field && !audited_multi_field {
                        self.audit.record_multi_field(source);
                        audited_multi_field = true;
                    }
                    count_skip(&mut counters, reason);
                    continue;
                }
            };

            if parsed.multi_field && !audited_multi_field {
                self.audit.record_multi_field(source);
                audited_multi_field = true;
            }

            let Some(email_norm) = normalize_email(&parsed.email) else {
                counters.skipped_no_email += 1;
                metrics::counter!("ingest_lines_skipped_total", "reason" => "no_email")
                    .increment(1);
                continue;
            };

            let email_hash = self.hasher.hash_hex(&email_norm);
            let hash_type = classify(&parsed.credential);

            let record = ShardRecord {
                email_hash,
                password: parsed.credential,
                is_hash: hash_type.is_hash(),
                hash_type,
                email: if self.options.scrub_email {
                    String::new()
                } else {
                    email_norm
                },
                source: source_str.clone(),
            };

            let line = record.to_json_line()?;
            self.streams
                .append(record.shard_prefix(), line.as_bytes())
                .await?;
            counters.accepted += 1;
        }

        metrics::counter!("ingest_records_accepted_total").increment(counters.accepted);
        debug!(
            source = %source.display(),
            lines = line_no,
            accepted = counters.accepted,
            skipped = counters.skipped_total(),
            "finished source"
        );

        Ok(counters)
    }
}

fn count_skip(counters: &mut FileCounters, reason: SkipReason) {
    let label = match reason {
        SkipReason::Empty => {
            counters.skipped_empty += 1;
            "empty"
        }
        SkipReason::FieldCount => {
            counters.skipped_field_count += 1;
            "field_count"
        }
        SkipReason::Oversize => {
            counters.skipped_oversize += 1;
            "oversize"
        }
        SkipReason::NoEmail => {
            counters.skipped_no_email += 1;
            "no_email"
        }
    };
    metrics::counter!("ingest_lines_skipped_total", "reason" => label).increment(1);
}
