//! Per-line credential record extraction.
//!
//! Dump files are one record per line, but the delimiter and field order
//! vary between (and sometimes within) files. The parser infers the
//! delimiter per line, assigns field roles by shape, and classifies every
//! rejection so the processor can keep per-cause counters.
//!
//! # Field-count policy
//!
//! - Exactly two non-empty fields: a candidate record.
//! - More than two fields under the chosen delimiter: the line is flagged
//!   multi-field (the source file gets one audit entry); by default the
//!   first two fields are salvaged, or the whole line is rejected when the
//!   parser is configured to do so.
//! - Fewer than two non-empty fields: skipped.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum combined byte length of email + credential + source path.
pub const MAX_RECORD_LEN: usize = 4000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email regex should compile"));

/// Why a line was not turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty after cleaning and trimming.
    Empty,
    /// Not exactly two usable fields.
    FieldCount,
    /// Neither field looks like an email.
    NoEmail,
    /// Combined record length exceeds [`MAX_RECORD_LEN`].
    Oversize,
}

/// A successfully extracted (email, credential) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub email: String,
    pub credential: String,
    /// The line carried more than two fields under its delimiter.
    pub multi_field: bool,
}

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(ParsedLine),
    /// `multi_field` is reported even on skips so callers can audit the
    /// source schema when multi-field lines are configured to be rejected.
    Skip {
        reason: SkipReason,
        multi_field: bool,
    },
}

/// Per-file line parser.
#[derive(Debug, Clone)]
pub struct LineParser {
    source_len: usize,
    reject_multi_field: bool,
}

impl LineParser {
    /// `source_len` is the byte length of the source path, counted against
    /// the oversize guard.
    pub fn new(source_len: usize, reject_multi_field: bool) -> Self {
        Self {
            source_len,
            reject_multi_field,
        }
    }

    /// Parse one raw line (newline terminator optional).
    pub fn parse(&self, raw: &str) -> LineOutcome {
        let cleaned = clean_line(raw);
        let line = cleaned.trim();
        if line.is_empty() {
            return LineOutcome::Skip {
                reason: SkipReason::Empty,
                multi_field: false,
            };
        }

        let Some((first, second, multi_field)) = split_fields(line) else {
            return LineOutcome::Skip {
                reason: SkipReason::FieldCount,
                multi_field: false,
            };
        };
        let (first, second) = (first.trim(), second.trim());
        if first.is_empty() || second.is_empty() {
            return LineOutcome::Skip {
                reason: SkipReason::FieldCount,
                multi_field,
            };
        }
        if multi_field && self.reject_multi_field {
            return LineOutcome::Skip {
                reason: SkipReason::FieldCount,
                multi_field,
            };
        }

        let (email, credential) = if EMAIL_RE.is_match(first) {
            (first, second)
        } else if EMAIL_RE.is_match(second) {
            (second, first)
        } else {
            return LineOutcome::Skip {
                reason: SkipReason::NoEmail,
                multi_field,
            };
        };

        if email.len() + credential.len() + self.source_len > MAX_RECORD_LEN {
            return LineOutcome::Skip {
                reason: SkipReason::Oversize,
                multi_field,
            };
        }

        LineOutcome::Record(ParsedLine {
            email: email.to_string(),
            credential: credential.to_string(),
            multi_field,
        })
    }
}

/// Split into the first two fields, preferring `:`, then `;`, then a
/// whitespace run. The bool reports whether more fields followed.
fn split_fields(line: &str) -> Option<(&str, &str, bool)> {
    for delim in [':', ';'] {
        if line.contains(delim) {
            let mut parts = line.split(delim);
            let first = parts.next()?;
            let second = parts.next()?;
            return Some((first, second, parts.next().is_some()));
        }
    }
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    Some((first, second, parts.next().is_some()))
}

/// Strip a leading BOM and stray control bytes (0x00-0x1F, 0x7F).
fn clean_line(raw: &str) -> Cow<'_, str> {
    let s = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if s.bytes().any(|b| b < 0x20 || b == 0x7f) {
        Cow::Owned(s.chars().filter(|c| !c.is_ascii_control()).collect())
    } else {
        Cow::Borrowed(s)
    }
}
