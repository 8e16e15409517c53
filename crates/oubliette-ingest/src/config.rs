//! Engine configuration loaded from environment variables.
//!
//! All settings are read once at startup via [`Config::from_env`]. The
//! binary layers a few command-line overrides on top; nothing re-reads the
//! environment after startup.

use std::path::PathBuf;
use std::time::Duration;

use oubliette_core::HashKey;

use crate::error::{Error, Result};

/// Default LRU capacity for open shard writers.
pub const DEFAULT_MAX_STREAMS: usize = 64;
/// Default records per writer before a forced flush.
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Default timer-driven flush period in milliseconds.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 2000;
/// Default worker task count.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Log verbosity, from the `LOG_LEVEL` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Parse `ERROR` / `INFO` / `DEBUG` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Self::Error),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            other => Err(Error::Config(format!(
                "LOG_LEVEL must be ERROR, INFO or DEBUG, got {other:?}"
            ))),
        }
    }

    /// The tracing filter directive this level maps to.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC key under which emails are hashed.
    pub key: HashKey,

    /// Root walked recursively for `.txt` input files.
    pub input_dir: PathBuf,

    /// Root under which `hh/hhhh.jsonl` shards are written.
    pub shard_dir: PathBuf,

    /// LRU capacity for open shard writers.
    pub max_streams: usize,

    /// Records per writer before a forced flush.
    pub batch_size: usize,

    /// Timer-driven flush period.
    pub batch_interval: Duration,

    /// Worker task count.
    pub concurrency: usize,

    /// Log verbosity.
    pub log_level: LogLevel,

    /// Prometheus port; 0 disables the metrics server.
    pub metrics_port: u16,

    /// Emit `email: ""` in shard records instead of the normalized email.
    pub scrub_email: bool,

    /// Skip the first line of every input file unconditionally.
    pub skip_header: bool,

    /// Reject lines with more than two fields instead of salvaging the
    /// first two.
    pub reject_multi_field: bool,

    /// Progress document name under the shard root.
    pub progress_file: String,

    /// Skipped-files log name under the shard root.
    pub skipped_log: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Mandatory: `EMAIL_HASH_KEY` (64 hex chars), `INPUT_DIR`, `SHARD_DIR`.
    ///
    /// Optional (with defaults): `MAX_STREAMS` (64), `BATCH_SIZE` (500),
    /// `BATCH_INTERVAL_MS` (2000), `CONCURRENCY` (2), `LOG_LEVEL` (INFO),
    /// `METRICS_PORT` (0 = disabled), `SCRUB_EMAIL`, `SKIP_HEADER`,
    /// `REJECT_MULTI_FIELD` (all false), `PROGRESS_FILE`
    /// (ingest-progress.json), `SKIPPED_LOG` (skipped.log).
    pub fn from_env() -> Result<Self> {
        let key_hex = require_var("EMAIL_HASH_KEY")?;
        let key = HashKey::from_hex(&key_hex)?;

        let input_dir = PathBuf::from(require_var("INPUT_DIR")?);
        let shard_dir = PathBuf::from(require_var("SHARD_DIR")?);

        let config = Self {
            key,
            input_dir,
            shard_dir,
            max_streams: parse_var("MAX_STREAMS", DEFAULT_MAX_STREAMS)?,
            batch_size: parse_var("BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            batch_interval: Duration::from_millis(parse_var(
                "BATCH_INTERVAL_MS",
                DEFAULT_BATCH_INTERVAL_MS,
            )?),
            concurrency: parse_var("CONCURRENCY", DEFAULT_CONCURRENCY)?,
            log_level: match std::env::var("LOG_LEVEL") {
                Ok(v) => LogLevel::parse(&v)?,
                Err(_) => LogLevel::default(),
            },
            metrics_port: parse_var("METRICS_PORT", 0u16)?,
            scrub_email: bool_var("SCRUB_EMAIL"),
            skip_header: bool_var("SKIP_HEADER"),
            reject_multi_field: bool_var("REJECT_MULTI_FIELD"),
            progress_file: std::env::var("PROGRESS_FILE")
                .unwrap_or_else(|_| "ingest-progress.json".to_string()),
            skipped_log: std::env::var("SKIPPED_LOG").unwrap_or_else(|_| "skipped.log".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_streams == 0 {
            return Err(Error::Config("MAX_STREAMS must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("CONCURRENCY must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Log the effective configuration (never the key material).
    pub fn log(&self) {
        tracing::info!(
            input_dir = %self.input_dir.display(),
            shard_dir = %self.shard_dir.display(),
            max_streams = self.max_streams,
            batch_size = self.batch_size,
            batch_interval_ms = self.batch_interval.as_millis() as u64,
            concurrency = self.concurrency,
            metrics_port = self.metrics_port,
            scrub_email = self.scrub_email,
            skip_header = self.skip_header,
            reject_multi_field = self.reject_multi_field,
            "configuration loaded"
        );
    }

    /// Full path of the progress document.
    pub fn progress_path(&self) -> PathBuf {
        self.shard_dir.join(&self.progress_file)
    }

    /// Full path of the skipped-files log.
    pub fn skipped_log_path(&self) -> PathBuf {
        self.shard_dir.join(&self.skipped_log)
    }

    /// Full path of the multi-field audit log.
    pub fn multi_field_log_path(&self) -> PathBuf {
        self.shard_dir.join("multi_field_files.log")
    }
}

fn require_var(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{name} must be set"))),
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}
