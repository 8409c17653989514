//! Append-only session transcript.

use std::fmt;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const BANNER_RUNNING: &str = "Running…";
pub const BANNER_ABORTED: &str = "Program aborted.";
pub const BANNER_SUCCESS: &str = "Program terminated successfully.";
pub const BANNER_ERROR: &str = "Program error.";

/// One immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    /// Submitted terminal input.
    Echo { text: String },
    /// Program output or error text; `ok == false` means error styling.
    Text { ok: bool, body: String },
    /// Lifecycle announcement.
    Banner { message: String },
    /// Wall-clock duration of a successful program run.
    Timing { seconds: f64, timestamp: String },
}

impl LogEntry {
    #[must_use]
    pub fn echo(text: impl Into<String>) -> Self {
        Self::Echo { text: text.into() }
    }

    #[must_use]
    pub fn text(ok: bool, body: impl Into<String>) -> Self {
        Self::Text {
            ok,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn banner(message: impl Into<String>) -> Self {
        Self::Banner {
            message: message.into(),
        }
    }

    /// Builds a timing entry stamped with the current UTC time.
    #[must_use]
    pub fn timing_now(seconds: f64) -> Self {
        Self::Timing {
            seconds,
            timestamp: now_timestamp(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Text { ok: false, .. })
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo { text } => write!(f, "> {text}"),
            Self::Text { body, .. } => f.write_str(body),
            Self::Banner { message } => f.write_str(message),
            Self::Timing { seconds, timestamp } => {
                write!(f, "Runtime: {seconds} s, at {timestamp}.")
            }
        }
    }
}

/// Ordered record of everything a session printed.
///
/// Entries are never edited or reordered; the log only grows, or is replaced
/// wholesale by [`OutputLog::clear`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputLog {
    entries: Vec<LogEntry>,
}

impl OutputLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Returns entries appended at or after `index`; empty when `index` is past the end.
    #[must_use]
    pub fn entries_since(&self, index: usize) -> &[LogEntry] {
        self.entries.get(index..).unwrap_or(&[])
    }

    #[must_use]
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }
}

fn now_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    // Rfc3339 only fails for years outside 0..=9999.
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
