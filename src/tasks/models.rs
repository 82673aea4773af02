//! Task model types for the task store.
//!
//! Front matter values are kept as the strings found on disk so that a
//! task with a typo in its `status` or `priority` can still be loaded and
//! reported by validation instead of failing to parse.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status value for open work.
pub const STATUS_OPEN: &str = "open";
/// Status value for claimed work.
pub const STATUS_IN_PROGRESS: &str = "in_progress";
/// Status value for finished work.
pub const STATUS_DONE: &str = "done";
/// Status value for abandoned work.
pub const STATUS_CANCELLED: &str = "cancelled";
/// Status value for work tracked elsewhere.
pub const STATUS_DUPLICATE: &str = "duplicate";

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Priority {
    /// High priority.
    High = 0,
    /// Medium priority (default).
    #[default]
    Medium = 1,
    /// Low priority.
    Low = 2,
}

impl Priority {
    /// Parse a priority from a string. Empty input is medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a known priority.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, InvalidPriority> {
        match normalize_priority(s).as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(InvalidPriority(s.to_string())),
        }
    }

    /// Get the string representation of the priority.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an invalid priority string is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPriority(pub String);

impl std::fmt::Display for InvalidPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid priority {:?}: must be high, medium, or low", self.0)
    }
}

impl std::error::Error for InvalidPriority {}

/// Lowercase and trim a priority, defaulting empty input to `medium`.
#[must_use]
pub fn normalize_priority(priority: &str) -> String {
    let p = priority.trim().to_lowercase();
    if p.is_empty() {
        Priority::Medium.as_str().to_string()
    } else {
        p
    }
}

/// Sortable rank where lower is more urgent. Unknown values sort last.
#[must_use]
pub fn priority_rank(priority: &str) -> u8 {
    Priority::from_str(priority).map_or(3, |p| p as u8)
}

/// Whether a priority is empty or one of the known values.
#[must_use]
pub fn is_valid_priority(priority: &str) -> bool {
    Priority::from_str(priority).is_ok()
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Task is open and available for work.
    #[default]
    Open,
    /// Task has been claimed.
    InProgress,
    /// Task has been completed.
    Done,
    /// Task was abandoned.
    Cancelled,
    /// Task duplicates another task.
    Duplicate,
}

impl Status {
    /// Parse a status from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid status.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, InvalidStatus> {
        match normalize_status(s).as_str() {
            STATUS_OPEN => Ok(Self::Open),
            STATUS_IN_PROGRESS => Ok(Self::InProgress),
            STATUS_DONE => Ok(Self::Done),
            STATUS_CANCELLED => Ok(Self::Cancelled),
            STATUS_DUPLICATE => Ok(Self::Duplicate),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }

    /// Get the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => STATUS_OPEN,
            Self::InProgress => STATUS_IN_PROGRESS,
            Self::Done => STATUS_DONE,
            Self::Cancelled => STATUS_CANCELLED,
            Self::Duplicate => STATUS_DUPLICATE,
        }
    }

    /// Whether work on a task with this status is still expected.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an invalid status string is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl std::fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid status {:?}: must be one of {}",
            self.0,
            allowed_status_values().join(", ")
        )?;
        if let Some(hint) = status_hint(&self.0) {
            write!(f, " (did you mean '{hint}'?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidStatus {}

/// Lowercase and trim a status. Empty stays empty.
#[must_use]
pub fn normalize_status(status: &str) -> String {
    status.trim().to_lowercase()
}

/// Whether a status is empty or one of the allowed values.
#[must_use]
pub fn is_valid_status(status: &str) -> bool {
    status.trim().is_empty() || Status::from_str(status).is_ok()
}

/// All allowed status values, excluding the empty legacy value.
#[must_use]
pub const fn allowed_status_values() -> [&'static str; 5] {
    [STATUS_OPEN, STATUS_IN_PROGRESS, STATUS_DONE, STATUS_CANCELLED, STATUS_DUPLICATE]
}

/// Whether a status counts as active: `open`, `in_progress`, or empty.
#[must_use]
pub fn is_active_status(status: &str) -> bool {
    if status.trim().is_empty() {
        return true;
    }
    Status::from_str(status).is_ok_and(Status::is_active)
}

/// Suggest the allowed status a common misspelling was probably meant to be.
#[must_use]
pub fn status_hint(status: &str) -> Option<&'static str> {
    match normalize_status(status).as_str() {
        "completed" | "complete" | "finished" | "closed" | "resolved" => Some(STATUS_DONE),
        "wip" | "in-progress" | "inprogress" | "in progress" | "started" | "doing" | "active" => {
            Some(STATUS_IN_PROGRESS)
        }
        "canceled" | "abandoned" | "dropped" => Some(STATUS_CANCELLED),
        "todo" | "new" | "pending" | "ready" => Some(STATUS_OPEN),
        "dup" | "duplicated" | "dupe" => Some(STATUS_DUPLICATE),
        _ => None,
    }
}

/// Treat an explicit YAML `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The YAML front matter of a task file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Free-form kind of the task (task, epic, issue, ...).
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    /// Role responsible for the task.
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    /// `high`, `medium`, `low`, or empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: String,
    /// Parent task ID, empty for root tasks.
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent: String,
    /// Tasks that must finish before this one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub blockers: Vec<String>,
    /// Tasks waiting on this one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub blocks: Vec<String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    /// Last edit timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_edited: Option<DateTime<Utc>>,
    /// Whether the owner has approved the task.
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner_approval: bool,
    /// Legacy completion flag, kept in step with `status`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    /// Lifecycle status, see [`Status`].
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Recurrence rules. Opaque to the store.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub every: Vec<serde_yaml::Value>,
    /// One-line description.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Metadata {
    /// Whether the task still expects work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        is_active_status(&self.status)
    }

    /// Whether the task no longer holds up anything that depends on it.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.completed || !self.is_active()
    }

    /// Set `completed` and bring `status` along. Returns whether anything changed.
    pub fn set_completed(&mut self, completed: bool) -> bool {
        if self.completed == completed {
            return false;
        }
        self.completed = completed;
        if completed {
            self.status = STATUS_DONE.to_string();
        } else if self.status == STATUS_DONE {
            self.status = STATUS_OPEN.to_string();
        }
        true
    }
}

/// One entry of a task's TODO or subtask list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TodoItem {
    /// 1-based position in its list.
    pub index: usize,
    /// Whether the checkbox is ticked.
    pub checked: bool,
    /// Per-item role override.
    pub role: Option<String>,
    /// Item text after the markers.
    pub text: String,
    /// The item line as last read or written.
    pub raw: String,
    /// Linked child task for subtask entries.
    pub subtask_id: Option<String>,
    /// Free text attached on completion, one entry per line.
    pub report: Option<String>,
}

impl TodoItem {
    /// Render the item line without its report.
    #[must_use]
    pub fn head_line(&self) -> String {
        let mut line = String::from(if self.checked { "- [x] " } else { "- [ ] " });
        if let Some(subtask_id) = &self.subtask_id {
            line.push_str("(subtask: ");
            line.push_str(subtask_id);
            line.push_str(") ");
        } else if let Some(role) = &self.role {
            line.push_str("(role: ");
            line.push_str(role);
            line.push_str(") ");
        }
        line.push_str(&self.text);
        line
    }

    /// Render the item with its report lines indented beneath it.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = self.head_line();
        if let Some(report) = &self.report {
            for line in report.lines() {
                out.push_str("\n  ");
                out.push_str(line);
            }
        }
        out
    }

    /// Refresh `raw` after the item changed.
    pub(crate) fn touch(&mut self) {
        self.raw = self.head_line();
    }
}

/// A task loaded from (or destined for) a markdown file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Task {
    /// Canonical ID, equal to the task's directory name.
    pub id: String,
    /// Directory holding the task file.
    pub dir: PathBuf,
    /// Path of the task file.
    pub file_path: PathBuf,
    /// Front matter.
    pub meta: Metadata,
    /// First level-1 heading.
    pub title: String,
    /// Prose and unrecognized sections before the first list section.
    pub body: String,
    /// Plain TODO entries.
    pub todo_items: Vec<TodoItem>,
    /// Entries linking child tasks.
    pub subtask_items: Vec<TodoItem>,
    /// Lines inside list sections that are not list items, kept in order.
    pub stray_item_lines: Vec<String>,
    /// Content of the `## Progress` section.
    pub progress: String,
    /// Unrecognized sections after the first list section.
    pub other: String,
    /// Whether the task has changes not yet written to disk.
    pub dirty: bool,
}

impl Task {
    /// Create an empty task stored at `file_path`.
    #[must_use]
    pub fn new(id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let dir = file_path.parent().map(PathBuf::from).unwrap_or_default();
        Self { id: id.into(), dir, file_path, ..Self::default() }
    }

    /// Flag the task as modified.
    ///
    /// `date_edited` is bumped only on the clean to dirty transition, so a
    /// burst of edits before a save records a single edit time.
    pub fn mark_dirty(&mut self) {
        if !self.dirty {
            tracing::debug!(task_id = %self.id, "task marked dirty");
            self.meta.date_edited = Some(Utc::now());
        }
        self.dirty = true;
    }

    /// Replace the title.
    pub fn set_title(&mut self, title: &str) {
        if self.title == title {
            return;
        }
        self.title = title.to_string();
        self.mark_dirty();
    }

    /// Replace the body, dropping any title or list sections the new text carries.
    pub fn set_body(&mut self, body: &str) {
        self.body = crate::tasks::parser::clean_body(body);
        self.mark_dirty();
    }

    /// Role from the front matter, else the first TODO's role override.
    #[must_use]
    pub fn effective_role(&self) -> Option<&str> {
        if !self.meta.role.is_empty() {
            return Some(self.meta.role.as_str());
        }
        self.todo_items.iter().find_map(|item| item.role.as_deref())
    }

    /// Number of TODO entries not yet ticked.
    #[must_use]
    pub fn incomplete_todo_count(&self) -> usize {
        self.todo_items.iter().filter(|item| !item.checked).count()
    }

    /// Render the task as it is written to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the front matter cannot be encoded.
    pub fn content(&self) -> crate::error::Result<String> {
        crate::tasks::parser::render(self)
    }

    /// Renumber both item lists after entries moved.
    pub(crate) fn renumber(&mut self) {
        for (i, item) in self.todo_items.iter_mut().enumerate() {
            item.index = i + 1;
        }
        for (i, item) in self.subtask_items.iter_mut().enumerate() {
            item.index = i + 1;
        }
    }
}
