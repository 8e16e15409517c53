//! Append-only audit logs.
//!
//! Two low-volume logs live next to the shards:
//!
//! - `multi_field_files.log` — input files whose schema violates the
//!   two-field expectation, one path per line, recorded at most once per
//!   run (de-duplicated in memory).
//! - `skipped.log` — input files abandoned on errors, with a timestamp and
//!   the reason.
//!
//! Both are append-only and never rewritten; a write failure is logged and
//! otherwise ignored, since losing an audit line must never stall ingestion.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

struct MultiFieldLog {
    path: PathBuf,
    seen: HashSet<PathBuf>,
}

/// Append-only audit logs for schema anomalies and skipped files.
pub struct AuditLog {
    multi_field: Mutex<MultiFieldLog>,
    skipped_path: Mutex<PathBuf>,
}

impl AuditLog {
    pub fn new(multi_field_path: PathBuf, skipped_path: PathBuf) -> Self {
        Self {
            multi_field: Mutex::new(MultiFieldLog {
                path: multi_field_path,
                seen: HashSet::new(),
            }),
            skipped_path: Mutex::new(skipped_path),
        }
    }

    /// Record a source whose lines carry more than two fields.
    ///
    /// Each source is recorded at most once per run.
    pub fn record_multi_field(&self, source: &Path) {
        let mut log = self.multi_field.lock();
        if !log.seen.insert(source.to_path_buf()) {
            return;
        }
        let line = format!("{}\n", source.display());
        if let Err(e) = append_line(&log.path, &line) {
            warn!(path = %log.path.display(), error = %e, "failed to write multi-field audit entry");
        }
    }

    /// Record a source that was abandoned, with the reason.
    pub fn record_skipped(&self, source: &Path, reason: &str) {
        let path = self.skipped_path.lock();
        let line = format!(
            "{} {} - {}\n",
            Utc::now().to_rfc3339(),
            source.display(),
            reason
        );
        if let Err(e) = append_line(&path, &line) {
            warn!(path = %path.display(), error = %e, "failed to write skipped-file entry");
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn audit(tmp: &TempDir) -> AuditLog {
        AuditLog::new(
            tmp.path().join("multi_field_files.log"),
            tmp.path().join("skipped.log"),
        )
    }

    #[test]
    fn test_multi_field_recorded_once_per_run() {
        let tmp = TempDir::new().unwrap();
        let log = audit(&tmp);

        log.record_multi_field(Path::new("/in/a.txt"));
        log.record_multi_field(Path::new("/in/a.txt"));
        log.record_multi_field(Path::new("/in/b.txt"));

        let content = std::fs::read_to_string(tmp.path().join("multi_field_files.log")).unwrap();
        assert_eq!(content, "/in/a.txt\n/in/b.txt\n");
    }

    #[test]
    fn test_skipped_entries_append() {
        let tmp = TempDir::new().unwrap();
        let log = audit(&tmp);

        log.record_skipped(Path::new("/in/a.txt"), "I/O error: permission denied");
        log.record_skipped(Path::new("/in/b.txt"), "unreadable");

        let content = std::fs::read_to_string(tmp.path().join("skipped.log")).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("/in/a.txt - I/O error: permission denied"));
        assert!(lines[1].contains("/in/b.txt - unreadable"));
    }
}
