//! Bounded LRU cache of open shard writers.
//!
//! Up to 65,536 shards exist on disk, but only `MAX_STREAMS` may be open at
//! once; the cache is the hard file-descriptor budget. It exclusively owns
//! every open [`BatchWriter`]: eviction and shutdown closure go through it
//! and nowhere else.
//!
//! All state lives behind a single async mutex (single-mutator discipline),
//! so the open-writer bound holds at every instant. Appends pin their writer
//! via the `Arc` refcount; a writer evicted-and-closed between lookup and
//! append surfaces as [`Error::WriterClosed`] and is reopened once.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::writer::BatchWriter;

/// Stream cache configuration.
#[derive(Debug, Clone)]
pub struct StreamsConfig {
    /// Root under which `hh/hhhh.jsonl` shards are written.
    pub shard_root: PathBuf,
    /// Maximum simultaneously open shard writers.
    pub max_streams: usize,
    /// Records per writer before a forced flush.
    pub batch_size: usize,
    /// Timer-driven flush period.
    pub batch_interval: Duration,
}

struct State {
    open: LruCache<String, Arc<BatchWriter>>,
    closed: bool,
}

/// Counters for the shutdown summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub opens: u64,
    pub evictions: u64,
}

/// Bounded LRU over open shard writers.
pub struct ShardStreams {
    config: StreamsConfig,
    state: tokio::sync::Mutex<State>,
    opens: AtomicU64,
    evictions: AtomicU64,
}

impl ShardStreams {
    pub fn new(config: StreamsConfig) -> Result<Self> {
        let cap = NonZeroUsize::new(config.max_streams)
            .ok_or_else(|| Error::Config("MAX_STREAMS must be at least 1".to_string()))?;
        Ok(Self {
            config,
            state: tokio::sync::Mutex::new(State {
                open: LruCache::new(cap),
                closed: false,
            }),
            opens: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Append one encoded record line to the shard for `prefix`.
    ///
    /// `prefix` must be the four-hex-character shard prefix of the record's
    /// email hash.
    pub async fn append(&self, prefix: &str, line: &[u8]) -> Result<()> {
        // The Arc pins the writer across the await; if eviction closed it
        // between lookup and append, reopen once and retry.
        for _ in 0..2 {
            let writer = self.get(prefix).await?;
            match writer.append(line).await {
                Ok(()) => return Ok(()),
                Err(Error::WriterClosed) => continue,
                Err(e) => {
                    self.discard(prefix).await;
                    return Err(e);
                }
            }
        }
        Err(Error::WriterClosed)
    }

    /// Fetch the writer for `prefix`, opening (and possibly evicting) as
    /// needed. The returned writer is at MRU position.
    async fn get(&self, prefix: &str) -> Result<Arc<BatchWriter>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::StreamsClosed);
        }

        if let Some(writer) = state.open.get(prefix) {
            return Ok(Arc::clone(writer));
        }

        // At capacity: close the least recently used writer before opening
        // another, so the FD bound holds at every instant.
        if state.open.len() == state.open.cap().get()
            && let Some((evicted_prefix, evicted)) = state.open.pop_lru()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("ingest_stream_evictions_total").increment(1);
            debug!(prefix = %evicted_prefix, "evicting least recently used shard writer");
            if let Err(e) = evicted.close().await {
                warn!(prefix = %evicted_prefix, error = %e, "error closing evicted shard writer");
            }
        }

        let dir = self.config.shard_root.join(&prefix[..2]);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{prefix}.jsonl"));
        let writer = BatchWriter::open(&path, self.config.batch_size).await?;
        writer.start_ticker(self.config.batch_interval);

        self.opens.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_stream_opens_total").increment(1);
        debug!(prefix, path = %path.display(), "opened shard writer");

        state.open.put(prefix.to_string(), Arc::clone(&writer));
        metrics::gauge!("ingest_open_streams").set(state.open.len() as f64);
        Ok(writer)
    }

    /// Drop a writer whose append failed; closed best-effort.
    async fn discard(&self, prefix: &str) {
        let mut state = self.state.lock().await;
        if let Some(writer) = state.open.pop(prefix) {
            if let Err(e) = writer.close().await {
                warn!(prefix, error = %e, "error closing failed shard writer");
            }
            metrics::gauge!("ingest_open_streams").set(state.open.len() as f64);
        }
    }

    /// Close every open writer and poison the cache.
    ///
    /// Writers are drained concurrently; the first close error is returned
    /// after all closes have completed. Subsequent `append` calls fail with
    /// [`Error::StreamsClosed`].
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<(String, Arc<BatchWriter>)> = {
            let mut state = self.state.lock().await;
            state.closed = true;
            let mut drained = Vec::with_capacity(state.open.len());
            while let Some(entry) = state.open.pop_lru() {
                drained.push(entry);
            }
            drained
        };

        let mut set = JoinSet::new();
        for (prefix, writer) in drained {
            set.spawn(async move { (prefix, writer.close().await) });
        }

        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((prefix, Err(e))) => {
                    warn!(prefix = %prefix, error = %e, "error closing shard writer");
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    warn!(error = %e, "shard writer close task failed");
                }
            }
        }

        metrics::gauge!("ingest_open_streams").set(0.0);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Currently open writers (the LRU bound is `<= max_streams`).
    pub async fn open_count(&self) -> usize {
        self.state.lock().await.open.len()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            opens: self.opens.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn streams(root: &std::path::Path, max_streams: usize) -> ShardStreams {
        ShardStreams::new(StreamsConfig {
            shard_root: root.to_path_buf(),
            max_streams,
            batch_size: 1, // flush every record so files are readable mid-run
            batch_interval: Duration::from_secs(60),
        })
        .unwrap()
    }

    async fn shard_content(root: &std::path::Path, prefix: &str) -> String {
        let path = root.join(&prefix[..2]).join(format!("{prefix}.jsonl"));
        tokio::fs::read_to_string(path).await.unwrap_or_default()
    }

    #[tokio::test]
    async fn test_append_creates_subdir_and_shard() {
        let tmp = TempDir::new().unwrap();
        let streams = streams(tmp.path(), 4);

        streams.append("abcd", b"rec1").await.unwrap();
        streams.close_all().await.unwrap();

        assert!(tmp.path().join("ab").is_dir());
        assert_eq!(shard_content(tmp.path(), "abcd").await, "rec1\n");
    }

    #[tokio::test]
    async fn test_writer_reused_for_same_prefix() {
        let tmp = TempDir::new().unwrap();
        let streams = streams(tmp.path(), 4);

        streams.append("abcd", b"rec1").await.unwrap();
        streams.append("abcd", b"rec2").await.unwrap();
        assert_eq!(streams.stats().opens, 1);

        streams.close_all().await.unwrap();
        assert_eq!(shard_content(tmp.path(), "abcd").await, "rec1\nrec2\n");
    }

    #[tokio::test]
    async fn test_eviction_stress_round_robin() {
        // MAX_STREAMS=2, five prefixes round-robin: at most two writers open
        // at any instant, all five shards exist at the end, every record
        // appears exactly once, and every open beyond the still-open pair
        // was preceded by an eviction.
        let tmp = TempDir::new().unwrap();
        let streams = streams(tmp.path(), 2);
        let prefixes = ["aaaa", "bbbb", "cccc", "dddd", "eeee"];

        for round in 0..3 {
            for prefix in prefixes {
                let line = format!("{prefix}-{round}");
                streams.append(prefix, line.as_bytes()).await.unwrap();
                assert!(streams.open_count().await <= 2);
            }
        }

        let stats = streams.stats();
        let still_open = streams.open_count().await as u64;
        streams.close_all().await.unwrap();

        for prefix in prefixes {
            let content = shard_content(tmp.path(), prefix).await;
            let lines: Vec<_> = content.lines().collect();
            assert_eq!(
                lines,
                vec![
                    format!("{prefix}-0"),
                    format!("{prefix}-1"),
                    format!("{prefix}-2")
                ],
                "shard {prefix}"
            );
        }

        assert_eq!(stats.opens, stats.evictions + still_open);
        assert!(stats.opens >= prefixes.len() as u64);
        assert!(stats.evictions > 0);
    }

    #[tokio::test]
    async fn test_reopened_shard_appends() {
        let tmp = TempDir::new().unwrap();
        let streams = streams(tmp.path(), 1);

        streams.append("aaaa", b"one").await.unwrap();
        streams.append("bbbb", b"evictor").await.unwrap(); // evicts aaaa
        streams.append("aaaa", b"two").await.unwrap(); // reopens aaaa

        assert_eq!(streams.stats().evictions, 2);
        streams.close_all().await.unwrap();
        assert_eq!(shard_content(tmp.path(), "aaaa").await, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_append_after_close_all_fails() {
        let tmp = TempDir::new().unwrap();
        let streams = streams(tmp.path(), 2);
        streams.append("abcd", b"rec").await.unwrap();
        streams.close_all().await.unwrap();

        assert!(matches!(
            streams.append("abcd", b"late").await,
            Err(Error::StreamsClosed)
        ));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = ShardStreams::new(StreamsConfig {
            shard_root: tmp.path().to_path_buf(),
            max_streams: 0,
            batch_size: 1,
            batch_interval: Duration::from_secs(60),
        });
        assert!(result.is_err());
    }
}
