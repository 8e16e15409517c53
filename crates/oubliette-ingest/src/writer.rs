//! Batched append writer for a single shard file.
//!
//! Wraps one append-mode file handle behind a buffer of encoded lines.
//! The buffer is flushed when it reaches the configured record count, when
//! the periodic tick fires, or on explicit `flush()`/`close()`.
//!
//! # Durability
//!
//! Each flush issues a single write followed by a best-effort `sync_data`;
//! sync failures are logged as warnings, never fatal. After a successful
//! `close()` everything ever appended is on stable storage (subject to the
//! filesystem honoring fsync). A crash between flushes loses at most one
//! batch.
//!
//! # Close semantics
//!
//! `close()` cancels the tick task first, then flushes the remaining buffer
//! and releases the handle. It is idempotent; appends after close fail with
//! [`Error::WriterClosed`] so the stream cache can reopen the shard.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

struct Inner {
    file: Option<File>,
    buf: Vec<u8>,
    pending: usize,
}

/// Buffered append writer for one shard file.
///
/// Shared as `Arc<BatchWriter>`: the stream cache owns one reference, the
/// periodic flush task holds a weak one, and in-flight appends pin the
/// writer across eviction.
pub struct BatchWriter {
    path: PathBuf,
    batch_size: usize,
    inner: tokio::sync::Mutex<Inner>,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    records_written: AtomicU64,
    flushes: AtomicU64,
}

impl BatchWriter {
    /// Open (or create) the shard file for append.
    pub async fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Arc::new(Self {
            path,
            batch_size,
            inner: tokio::sync::Mutex::new(Inner {
                file: Some(file),
                buf: Vec::with_capacity(16 * 1024),
                pending: 0,
            }),
            ticker: parking_lot::Mutex::new(None),
            records_written: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }))
    }

    /// Spawn the periodic flush task.
    ///
    /// The task holds only a weak reference so a dropped writer does not
    /// keep ticking; `close()` aborts it explicitly before the final flush.
    pub fn start_ticker(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it.
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(writer) = weak.upgrade() else { break };
                if let Err(e) = writer.flush().await {
                    warn!(path = %writer.path.display(), error = %e, "periodic flush failed");
                }
            }
        });
        *self.ticker.lock() = Some(handle);
    }

    /// Append one encoded record line (without trailing newline).
    ///
    /// Flushes synchronously when the buffer reaches the batch size.
    pub async fn append(&self, line: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.file.is_none() {
            return Err(Error::WriterClosed);
        }
        inner.buf.extend_from_slice(line);
        inner.buf.push(b'\n');
        inner.pending += 1;
        if inner.pending >= self.batch_size {
            self.flush_locked(&mut inner).await?;
        }
        Ok(())
    }

    /// Flush any buffered records.
    ///
    /// A flush on an already-closed writer silently succeeds.
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.file.is_none() {
            return Ok(());
        }
        self.flush_locked(&mut inner).await
    }

    async fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.buf.is_empty() {
            return Ok(());
        }
        let records = inner.pending;
        let file = inner.file.as_mut().ok_or(Error::WriterClosed)?;
        file.write_all(&inner.buf).await?;
        if let Err(e) = file.sync_data().await {
            warn!(path = %self.path.display(), error = %e, "sync_data failed");
        }
        inner.buf.clear();
        inner.pending = 0;
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_batch_flushes_total").increment(1);
        debug!(path = %self.path.display(), records, "flushed batch");
        Ok(())
    }

    /// Flush remaining records, sync, and release the file handle.
    ///
    /// Idempotent; a second close is a no-op.
    pub async fn close(&self) -> Result<()> {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }

        let mut inner = self.inner.lock().await;
        if inner.file.is_none() {
            return Ok(());
        }
        self.flush_locked(&mut inner).await?;
        let Some(file) = inner.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.sync_all().await {
            warn!(path = %self.path.display(), error = %e, "sync_all on close failed");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records flushed to disk so far.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Batch flushes issued so far.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
        if let Ok(inner) = self.inner.try_lock()
            && inner.file.is_some()
            && !inner.buf.is_empty()
        {
            warn!(
                path = %self.path.display(),
                records = inner.pending,
                "writer dropped with unflushed records"
            );
        }
    }
}
