//! Append-only, timestamped comment history.
//!
//! Registrations and allocations keep a running log of human-readable
//! lines. Entries are only ever appended; rendering joins them with
//! newlines for notifications and reports.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Timestamp format used when rendering comment lines.
pub const COMMENT_TS_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One line of a comment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntry {
    pub created_at: Timestamp,
    pub body: String,
}

impl CommentEntry {
    pub fn new(created_at: Timestamp, body: impl Into<String>) -> Self {
        Self {
            created_at,
            body: body.into(),
        }
    }

    /// Render as `"<timestamp>: <body>"`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.created_at.format(COMMENT_TS_FORMAT), self.body)
    }
}

/// Render a history oldest-first, one entry per line.
pub fn render_log(entries: &[CommentEntry]) -> String {
    let mut sorted: Vec<&CommentEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.created_at);
    sorted
        .into_iter()
        .map(CommentEntry::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append `line` to a newline-delimited text column.
pub fn append_line(existing: Option<&str>, line: &str) -> String {
    match existing.map(str::trim_end).filter(|s| !s.is_empty()) {
        Some(prev) => format!("{prev}\n{line}"),
        None => line.to_string(),
    }
}
