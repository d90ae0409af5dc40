//! Append-only log of foreground window changes.
//!
//! One record per line: `<RFC 3339 timestamp> <window title>`.
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};

pub struct WindowLog {
    path: PathBuf,
}

impl WindowLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating the file and its parent directory if needed.
    /// Existing content is never rewritten.
    pub fn append(&self, timestamp: DateTime<Local>, title: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        // One write per record.
        file.write_all(format!("{}\n", format_record(timestamp, title)).as_bytes())
    }
}

/// Formats a record without the trailing newline. Line breaks inside the
/// title become spaces.
pub fn format_record(timestamp: DateTime<Local>, title: &str) -> String {
    let title: String = title.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }).collect();
    format!("{} {}", timestamp.to_rfc3339_opts(SecondsFormat::Millis, false), title)
}
