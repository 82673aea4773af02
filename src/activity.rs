//! Read-only access to the JSONL activity log.
//!
//! Each line is one event:
//!
//! ```json
//! {"timestamp":"2026-01-02T03:04:05Z","task_id":"T3k7x-example","type":"task_completed"}
//! ```
//!
//! Another process appends to the log; this module only reads it. Lines that
//! do not decode are skipped with a warning so a single bad write does not
//! hide the rest of the history.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::CompletionLog;

/// Event type recorded when a task is completed.
pub const EVENT_TASK_COMPLETED: &str = "task_completed";

/// One activity log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Task the event is about.
    pub task_id: String,
    /// Event type, e.g. `task_completed`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-text report attached to the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Extra key/value data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ActivityEntry {
    fn is_completion_since(&self, task_id: Option<&str>, since: DateTime<Utc>) -> bool {
        self.kind == EVENT_TASK_COMPLETED
            && self.timestamp >= since
            && task_id.map_or(true, |id| self.task_id == id)
    }
}

/// An activity log file on disk.
#[derive(Debug, Clone)]
pub struct ActivityLogFile {
    path: PathBuf,
}

impl ActivityLogFile {
    /// Read the log at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every decodable entry, oldest first. A missing file has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_entries(&self) -> Result<Vec<ActivityEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActivityEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %err,
                    "skipping malformed activity log entry"
                ),
            }
        }
        Ok(entries)
    }

    /// Time of the most recent completion of `task_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn latest_completion(&self, task_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .read_entries()?
            .into_iter()
            .filter(|entry| entry.kind == EVENT_TASK_COMPLETED && entry.task_id == task_id)
            .map(|entry| entry.timestamp)
            .max())
    }
}

impl CompletionLog for ActivityLogFile {
    fn count_completions_since(&self, task_id: Option<&str>, since: DateTime<Utc>) -> Result<usize> {
        Ok(self.read_entries()?.iter().filter(|entry| entry.is_completion_since(task_id, since)).count())
    }
}
