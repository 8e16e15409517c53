//! Error types for the ingestion engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (startup only, fatal).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the core building blocks.
    #[error(transparent)]
    Core(#[from] oubliette_core::Error),

    /// Append or flush on a writer that has already been closed.
    ///
    /// Distinguished so the stream cache can reopen the shard and retry.
    #[error("shard writer is closed")]
    WriterClosed,

    /// The stream cache has been shut down; no further writers may be opened.
    #[error("shard streams are closed")]
    StreamsClosed,

    /// A worker task failed to join.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
