//! Reading a free-task list back into task IDs.
//!
//! List files may be hand-edited or stale, so matching an entry to a task is
//! best effort. All of the heuristics live in [`match_list_entry`].

use std::path::{Component, Path, PathBuf};

use crate::paths::{normalize_lexically, to_slash};
use crate::tasks::id::extract_last_task_id_from_path;
use crate::tasks::loader::TaskMap;

/// Title used when a list file has none.
pub const DEFAULT_FREE_LIST_TITLE: &str = "Free tasks";

/// What a free list currently says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeListParse {
    /// The `# ` heading, or [`DEFAULT_FREE_LIST_TITLE`].
    pub title: String,
    /// Known task IDs listed, in file order, without repeats.
    pub ids: Vec<String>,
}

/// The path with `.` and leading `..` components removed, `/`-separated.
fn tail_of(path: &Path) -> String {
    let kept: PathBuf = normalize_lexically(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    to_slash(&kept)
}

fn is_suffix_at_boundary(longer: &str, shorter: &str) -> bool {
    !shorter.is_empty()
        && (longer == shorter || longer.strip_suffix(shorter).is_some_and(|head| head.ends_with('/')))
}

/// Find the task a list entry points at.
///
/// `target` is the link destination as written in a list file living in
/// `list_dir`. Tried in order:
/// 1. the target resolved against `list_dir` equals a task's file path
/// 2. the target and a task's file path end the same way, on a path
///    component boundary
/// 3. the last ID-shaped component of the target names a known task
#[must_use]
pub fn match_list_entry(list_dir: &Path, target: &str, tasks: &TaskMap) -> Option<String> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let resolved = normalize_lexically(&list_dir.join(target));
    if let Some(task) = tasks.values().find(|task| normalize_lexically(&task.file_path) == resolved) {
        return Some(task.id.clone());
    }

    let target_tail = tail_of(Path::new(target));
    let by_suffix = tasks.values().find(|task| {
        let task_tail = tail_of(&task.file_path);
        is_suffix_at_boundary(&task_tail, &target_tail) || is_suffix_at_boundary(&target_tail, &task_tail)
    });
    if let Some(task) = by_suffix {
        return Some(task.id.clone());
    }

    extract_last_task_id_from_path(target).filter(|id| tasks.contains_key(*id)).map(str::to_string)
}

/// The destination of a `[label](dest)` entry, or the entry itself.
fn entry_target(entry: &str) -> Option<&str> {
    if !entry.starts_with('[') {
        return Some(entry);
    }
    let open = entry.find("](")?;
    let close = entry.rfind(')')?;
    (close > open + 2).then(|| entry[open + 2..close].trim())
}

/// Parse free-list `content` read from `list_file`.
#[must_use]
pub fn parse_free_list(content: &str, list_file: &Path, tasks: &TaskMap) -> FreeListParse {
    let list_dir = crate::paths::list_dir(list_file);
    let mut title = DEFAULT_FREE_LIST_TITLE.to_string();
    let mut ids: Vec<String> = Vec::new();

    for line in content.lines().map(str::trim) {
        if let Some(heading) = line.strip_prefix("# ") {
            if !heading.trim().is_empty() {
                title = heading.trim().to_string();
            }
            continue;
        }
        let Some(entry) = line.strip_prefix("- ").map(str::trim) else { continue };

        let found = entry_target(entry)
            .and_then(|target| match_list_entry(list_dir, target, tasks))
            .or_else(|| match_list_entry(list_dir, entry, tasks));
        if let Some(id) = found {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    FreeListParse { title, ids }
}
