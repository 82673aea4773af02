//! Turning user input into canonical task IDs.

use crate::error::{Error, Result};
use crate::tasks::id::{extract_task_id_from_path, SHORT_ID_PATTERN};
use crate::tasks::loader::TaskMap;

/// Error when a referenced task is not found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNotFound(pub String);

impl std::fmt::Display for TaskNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task not found: {}", self.0)
    }
}

impl std::error::Error for TaskNotFound {}

/// How an ambiguous reference was being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `<PREFIX><token>` short ID.
    ShortId,
    /// Any leading part of an ID.
    Prefix,
}

/// Error when a reference matches more than one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousReference {
    /// The input as given, trimmed.
    pub input: String,
    /// Which stage found several matches.
    pub kind: MatchKind,
    /// Every matching ID, sorted.
    pub candidates: Vec<String>,
}

impl std::fmt::Display for AmbiguousReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            MatchKind::ShortId => "short id",
            MatchKind::Prefix => "prefix",
        };
        write!(f, "{label} {} is ambiguous: {}", self.input, self.candidates.join(", "))
    }
}

impl std::error::Error for AmbiguousReference {}

/// IDs in `tasks` starting with `prefix`. Sorted, since the map is.
fn ids_with_prefix(tasks: &TaskMap, prefix: &str) -> Vec<String> {
    tasks.keys().filter(|id| id.starts_with(prefix)).cloned().collect()
}

fn single(input: &str, kind: MatchKind, matches: Vec<String>) -> Option<Result<String>> {
    match matches.len() {
        0 => None,
        1 => matches.into_iter().next().map(Ok),
        _ => Some(Err(Error::task(AmbiguousReference {
            input: input.to_string(),
            kind,
            candidates: matches,
        }))),
    }
}

/// Resolve a full ID, short ID, ID prefix, or path containing an ID.
///
/// Stages, first hit wins:
/// 1. exact ID
/// 2. an ID-shaped component of a path
/// 3. short ID (`T3k7x` matches `T3k7x-*`)
/// 4. any ID prefix
///
/// # Errors
///
/// Returns [`AmbiguousReference`] when a stage matches several tasks and
/// [`TaskNotFound`] when nothing matches.
pub fn resolve_task_id(tasks: &TaskMap, input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::task(TaskNotFound(String::new())));
    }
    if tasks.contains_key(input) {
        return Ok(input.to_string());
    }

    if let Some(extracted) = extract_task_id_from_path(input) {
        if tasks.contains_key(extracted) {
            return Ok(extracted.to_string());
        }
    }

    if SHORT_ID_PATTERN.is_match(input) {
        let matches = ids_with_prefix(tasks, &format!("{input}-"));
        if let Some(result) = single(input, MatchKind::ShortId, matches) {
            return result;
        }
    }

    single(input, MatchKind::Prefix, ids_with_prefix(tasks, input))
        .unwrap_or_else(|| Err(Error::task(TaskNotFound(input.to_string()))))
}
