//! Prefix-sharded streaming ingestion engine for breach dumps.
//!
//! This crate turns directories of heterogeneous credential dump files into
//! a privacy-preserving, prefix-sharded, append-only JSONL store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Orchestrator │  walks INPUT_DIR, hands files to worker tasks
//! └──────┬───────┘
//!        │ per file
//!        ▼
//! ┌──────────────┐
//! │FileProcessor │  parse → normalize → hash → classify per line
//! └──────┬───────┘
//!        │ per record, by email_hash[0..4]
//!        ▼
//! ┌──────────────┐
//! │ ShardStreams │  bounded LRU of open shard writers
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ BatchWriter  │  buffered, fsynced appends to hh/hhhh.jsonl
//! └──────────────┘
//! ```
//!
//! A [`progress::ProgressStore`] tracks each input file through
//! `pending → in-progress → done`, so interrupted runs resume without
//! reprocessing completed files. Schema anomalies and abandoned files go to
//! the append-only [`audit::AuditLog`].

pub mod audit;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod streams;
pub mod writer;

// Re-export commonly used types at crate root
pub use audit::AuditLog;
pub use config::{Config, LogLevel};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, RunSummary, STOP_SENTINEL};
pub use processor::{FileCounters, FileProcessor, ProcessorOptions};
pub use progress::{FileState, ProgressStore};
pub use streams::{ShardStreams, StreamStats, StreamsConfig};
pub use writer::BatchWriter;
