//! Oubliette ingestion daemon.
//!
//! Walks a directory tree of breach dump files and writes their credential
//! records to a prefix-sharded, append-only JSONL store, keyed-hashing every
//! email on the way in.
//!
//! # Usage
//!
//! ```bash
//! # Configuration comes from the environment
//! EMAIL_HASH_KEY=<64 hex chars> \
//! INPUT_DIR=/data/dumps \
//! SHARD_DIR=/archive/shards \
//! oubliette-ingest
//!
//! # A few knobs can be overridden on the command line
//! oubliette-ingest --concurrency 4 --metrics-port 9090
//! ```
//!
//! # Graceful Shutdown
//!
//! SIGINT, SIGTERM, or a `STOP_INGESTION` file in the working directory all
//! trigger the same path:
//! 1. Workers stop claiming new files
//! 2. In-flight files are finished (never cancelled mid-file)
//! 3. Every shard writer is flushed and closed
//! 4. Progress is persisted, so the next run resumes where this one stopped

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use tracing_subscriber::EnvFilter;

use oubliette_core::metrics::{init_metrics, start_metrics_server};
use oubliette_ingest::{Config, LogLevel, Orchestrator, RunSummary};

/// Oubliette ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "oubliette-ingest")]
#[command(about = "Prefix-sharded breach dump ingestion engine")]
#[command(version)]
struct Args {
    /// Input root to walk for .txt dumps (overrides INPUT_DIR)
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Shard root directory (overrides SHARD_DIR)
    #[arg(long)]
    shard_dir: Option<PathBuf>,

    /// Worker task count (overrides CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Metrics HTTP server port, 0 to disable (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Emit an empty email field in shard records (overrides SCRUB_EMAIL)
    #[arg(long)]
    scrub_email: bool,

    /// Skip the first line of every input file (overrides SKIP_HEADER)
    #[arg(long)]
    skip_header: bool,

    /// Reject lines with more than two fields instead of salvaging the
    /// first two (overrides REJECT_MULTI_FIELD)
    #[arg(long)]
    reject_multi_field: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing first, so configuration errors are visible. LOG_LEVEL sets
    // the default directive; RUST_LOG still takes precedence.
    let level = match std::env::var("LOG_LEVEL") {
        Ok(v) => LogLevel::parse(&v).context("invalid LOG_LEVEL")?,
        Err(_) => LogLevel::default(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(level.directive().parse().expect("static directive parses")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("oubliette ingestion engine starting...");

    let mut config = Config::from_env().context("invalid configuration")?;
    apply_overrides(&mut config, &args);
    config.log();

    // Metrics server (optional)
    if config.metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(config.metrics_port, handle)
            .await
            .context("failed to start metrics server")?;
        gauge!("ingest_running").set(1.0);
    }

    let orchestrator = Orchestrator::new(config)
        .await
        .context("failed to initialize pipeline")?;

    // Both signals set the same flag the workers poll between claims.
    let stop = orchestrator.stop_flag();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received, stopping gracefully...");
        stop.store(true, Ordering::SeqCst);
    })
    .context("failed to set signal handler")?;

    let summary = orchestrator.run().await?;

    gauge!("ingest_running").set(0.0);
    print_summary(&summary);

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ref input_dir) = args.input_dir {
        config.input_dir = input_dir.clone();
    }
    if let Some(ref shard_dir) = args.shard_dir {
        config.shard_dir = shard_dir.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if args.scrub_email {
        config.scrub_email = true;
    }
    if args.skip_header {
        config.skip_header = true;
    }
    if args.reject_multi_field {
        config.reject_multi_field = true;
    }
}

fn print_summary(summary: &RunSummary) {
    tracing::info!("═══════════════════════════════════════════════════════");
    if summary.stopped_early {
        tracing::info!("GRACEFUL STOP");
    } else {
        tracing::info!("RUN COMPLETE");
    }
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Files done:            {}", summary.files_done);
    tracing::info!("Files already done:    {}", summary.files_skipped_done);
    tracing::info!("Files failed:          {}", summary.files_failed);
    tracing::info!("Files remaining:       {}", summary.files_remaining);
    tracing::info!("Records accepted:      {}", summary.counters.accepted);
    tracing::info!("Skipped empty:         {}", summary.counters.skipped_empty);
    tracing::info!("Skipped field count:   {}", summary.counters.skipped_field_count);
    tracing::info!("Skipped oversize:      {}", summary.counters.skipped_oversize);
    tracing::info!("Skipped no email:      {}", summary.counters.skipped_no_email);
    tracing::info!("Shard writer opens:    {}", summary.stream_opens);
    tracing::info!("Shard evictions:       {}", summary.stream_evictions);
}
