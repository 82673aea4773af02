//! Collaborator traits the store depends on.
//!
//! Mock implementations live in [`crate::testing`].

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Trait for checking that roles named by tasks exist.
///
/// Validation calls this for every task's effective role.
pub trait RoleCatalog {
    /// Whether `role` is defined.
    fn role_exists(&self, role: &str) -> bool;

    /// Where `role` is expected to be defined, for error messages.
    ///
    /// For the directory-backed catalog this is the role file path.
    fn describe_role(&self, role: &str) -> String;
}

/// Trait for reading task completion events.
///
/// The store never writes completions; an external activity log does.
pub trait CompletionLog {
    /// Count completions at or after `since`.
    ///
    /// # Arguments
    ///
    /// * `task_id` - Only count completions of this task, or of any task when `None`.
    /// * `since` - Inclusive lower bound on the completion time.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    fn count_completions_since(&self, task_id: Option<&str>, since: DateTime<Utc>) -> Result<usize>;
}
