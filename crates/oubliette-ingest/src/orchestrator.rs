//! Work distribution and graceful shutdown.
//!
//! The orchestrator enumerates input files, hands them to a small pool of
//! worker tasks through a shared claim index, and owns the shutdown
//! sequence: stop claiming, drain in-flight files, close every shard
//! writer, persist progress, exit.
//!
//! # Stopping
//!
//! Two triggers set the same stop flag: process signals (SIGINT/SIGTERM,
//! wired up by the binary) and a `STOP_INGESTION` sentinel file in the
//! working directory, checked before each claim. A worker that has started
//! a file always finishes it — there is no mid-file cancel, because a
//! partially written file marked `done` would corrupt the resume semantic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use oubliette_core::email::EmailHasher;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::processor::{FileCounters, FileProcessor, ProcessorOptions};
use crate::progress::{FileState, ProgressStore};
use crate::streams::{ShardStreams, StreamsConfig};

/// Sentinel file name; its presence in the working directory requests a
/// graceful stop. Deleted on clean exit.
pub const STOP_SENTINEL: &str = "STOP_INGESTION";

/// Shutdown summary, logged and returned to the binary.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub files_done: u64,
    pub files_failed: u64,
    pub files_skipped_done: u64,
    pub files_remaining: u64,
    pub counters: FileCounters,
    pub stream_opens: u64,
    pub stream_evictions: u64,
    pub stopped_early: bool,
}

#[derive(Default)]
struct Totals {
    files_done: AtomicU64,
    files_failed: AtomicU64,
    files_skipped_done: AtomicU64,
    accepted: AtomicU64,
    skipped_empty: AtomicU64,
    skipped_field_count: AtomicU64,
    skipped_oversize: AtomicU64,
    skipped_no_email: AtomicU64,
}

impl Totals {
    fn add_counters(&self, c: &FileCounters) {
        self.accepted.fetch_add(c.accepted, Ordering::Relaxed);
        self.skipped_empty
            .fetch_add(c.skipped_empty, Ordering::Relaxed);
        self.skipped_field_count
            .fetch_add(c.skipped_field_count, Ordering::Relaxed);
        self.skipped_oversize
            .fetch_add(c.skipped_oversize, Ordering::Relaxed);
        self.skipped_no_email
            .fetch_add(c.skipped_no_email, Ordering::Relaxed);
    }

    fn counters(&self) -> FileCounters {
        FileCounters {
            accepted: self.accepted.load(Ordering::Relaxed),
            skipped_empty: self.skipped_empty.load(Ordering::Relaxed),
            skipped_field_count: self.skipped_field_count.load(Ordering::Relaxed),
            skipped_oversize: self.skipped_oversize.load(Ordering::Relaxed),
            skipped_no_email: self.skipped_no_email.load(Ordering::Relaxed),
        }
    }
}

/// Drives the whole ingestion run.
pub struct Orchestrator {
    config: Config,
    streams: Arc<ShardStreams>,
    progress: Arc<ProgressStore>,
    audit: Arc<AuditLog>,
    processor: Arc<FileProcessor>,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Build the pipeline components.
    ///
    /// Fails fast on an unreachable input root or an uncreatable shard root
    /// (fatal configuration errors).
    pub async fn new(config: Config) -> Result<Self> {
        if !config.input_dir.is_dir() {
            return Err(Error::Config(format!(
                "INPUT_DIR is not a readable directory: {}",
                config.input_dir.display()
            )));
        }
        tokio::fs::create_dir_all(&config.shard_dir)
            .await
            .map_err(|e| {
                Error::Config(format!(
                    "cannot create SHARD_DIR {}: {e}",
                    config.shard_dir.display()
                ))
            })?;

        let streams = Arc::new(ShardStreams::new(StreamsConfig {
            shard_root: config.shard_dir.clone(),
            max_streams: config.max_streams,
            batch_size: config.batch_size,
            batch_interval: config.batch_interval,
        })?);

        let progress = Arc::new(ProgressStore::load(config.progress_path()).await);

        let audit = Arc::new(AuditLog::new(
            config.multi_field_log_path(),
            config.skipped_log_path(),
        ));

        let processor = Arc::new(FileProcessor::new(
            EmailHasher::new(config.key.clone()),
            Arc::clone(&streams),
            Arc::clone(&audit),
            ProcessorOptions {
                scrub_email: config.scrub_email,
                skip_header: config.skip_header,
                reject_multi_field: config.reject_multi_field,
            },
        ));

        Ok(Self {
            config,
            streams,
            progress,
            audit,
            processor,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The stop flag; the binary wires signal handlers to it.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run to completion or graceful stop.
    pub async fn run(&self) -> Result<RunSummary> {
        let files = Arc::new(collect_input_files(&self.config.input_dir)?);
        info!(
            count = files.len(),
            root = %self.config.input_dir.display(),
            "enumerated input files"
        );
        self.progress.mark_pending_all(&files).await;

        let next = Arc::new(AtomicUsize::new(0));
        let totals = Arc::new(Totals::default());
        let drain_logged = Arc::new(AtomicBool::new(false));

        info!(workers = self.config.concurrency, "running");
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.concurrency);
        for worker_id in 0..self.config.concurrency {
            let files = Arc::clone(&files);
            let next = Arc::clone(&next);
            let totals = Arc::clone(&totals);
            let stop = Arc::clone(&self.stop);
            let drain_logged = Arc::clone(&drain_logged);
            let progress = Arc::clone(&self.progress);
            let processor = Arc::clone(&self.processor);
            let audit = Arc::clone(&self.audit);

            handles.push(tokio::spawn(async move {
                worker_loop(
                    worker_id,
                    files,
                    next,
                    totals,
                    stop,
                    drain_logged,
                    progress,
                    processor,
                    audit,
                )
                .await;
            }));
        }

        for handle in handles {
            handle.await?;
        }

        // Drained: release every shard writer, then the final progress write.
        self.streams.close_all().await?;
        if let Err(e) = self.progress.persist().await {
            warn!(error = %e, "final progress persist failed");
        }
        remove_sentinel();
        info!("closed");

        let snapshot = self.progress.snapshot().await;
        let remaining = snapshot
            .values()
            .filter(|s| **s != FileState::Done)
            .count() as u64;
        let stream_stats = self.streams.stats();

        Ok(RunSummary {
            files_done: totals.files_done.load(Ordering::Relaxed),
            files_failed: totals.files_failed.load(Ordering::Relaxed),
            files_skipped_done: totals.files_skipped_done.load(Ordering::Relaxed),
            files_remaining: remaining,
            counters: totals.counters(),
            stream_opens: stream_stats.opens,
            stream_evictions: stream_stats.evictions,
            stopped_early: self.stop.load(Ordering::SeqCst),
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    files: Arc<Vec<PathBuf>>,
    next: Arc<AtomicUsize>,
    totals: Arc<Totals>,
    stop: Arc<AtomicBool>,
    drain_logged: Arc<AtomicBool>,
    progress: Arc<ProgressStore>,
    processor: Arc<FileProcessor>,
    audit: Arc<AuditLog>,
) {
    loop {
        if stop.load(Ordering::SeqCst) || sentinel_present() {
            stop.store(true, Ordering::SeqCst);
            if !drain_logged.swap(true, Ordering::SeqCst) {
                info!("stop requested, draining in-flight files");
            }
            break;
        }

        let idx = next.fetch_add(1, Ordering::SeqCst);
        let Some(source) = files.get(idx) else { break };

        if progress.has_done(source).await {
            debug!(worker_id, source = %source.display(), "already done, skipping");
            totals.files_skipped_done.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        progress.mark_in_progress(source).await;
        info!(worker_id, source = %source.display(), "processing file");

        match processor.process(source).await {
            Ok(counters) => {
                progress.mark_done(source).await;
                totals.files_done.fetch_add(1, Ordering::Relaxed);
                totals.add_counters(&counters);
                metrics::counter!("ingest_files_done_total").increment(1);
                info!(
                    worker_id,
                    source = %source.display(),
                    accepted = counters.accepted,
                    skipped = counters.skipped_total(),
                    "file done"
                );
            }
            Err(e) => {
                // Left in-progress on purpose: the next run retries it.
                warn!(
                    worker_id,
                    source = %source.display(),
                    error = %e,
                    "failed to process file, leaving in-progress for retry"
                );
                audit.record_skipped(source, &e.to_string());
                totals.files_failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("ingest_files_failed_total").increment(1);
            }
        }
    }
}

/// Recursively enumerate `.txt` files (case-insensitive extension) under
/// the input root, as sorted absolute paths.
fn collect_input_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "error walking input root, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_txt = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_txt {
            continue;
        }
        files.push(std::path::absolute(entry.path())?);
    }
    files.sort();
    Ok(files)
}

fn sentinel_present() -> bool {
    Path::new(STOP_SENTINEL).exists()
}

fn remove_sentinel() {
    match std::fs::remove_file(STOP_SENTINEL) {
        Ok(()) => info!("removed stop sentinel"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "could not remove stop sentinel"),
    }
}
