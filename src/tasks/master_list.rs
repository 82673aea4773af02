//! The generated root and free task lists.
//!
//! Both lists are markdown files with one `- [label](path)` entry per task,
//! paths relative to the list file's directory. The free list is split into
//! `## High`, `## Medium`, `## Low` and, when needed, `## Other` sections.
//! Entries are sorted by task file path so the output does not depend on
//! load order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths::{list_link, to_slash};
use crate::storage::write_atomic_str;
use crate::tasks::free_list::{parse_free_list, DEFAULT_FREE_LIST_TITLE};
use crate::tasks::loader::TaskMap;
use crate::tasks::models::{Priority, Task};
use crate::tasks::resolve::TaskNotFound;

/// Title of the root task list.
pub const ROOT_LIST_TITLE: &str = "Root tasks";

/// Changes to apply to the free list after one task finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalFreeListUpdate {
    /// Tasks to drop from the list.
    pub remove_task_ids: Vec<String>,
    /// Tasks that just became free.
    pub add_task_ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct ListEntry {
    path: PathBuf,
    label: String,
}

impl ListEntry {
    fn for_task(task: &Task) -> Self {
        let label = if task.title.is_empty() { task.id.clone() } else { task.title.clone() };
        Self { path: task.file_path.clone(), label }
    }
}

#[derive(Debug, Default)]
struct FreeBuckets {
    high: Vec<ListEntry>,
    medium: Vec<ListEntry>,
    low: Vec<ListEntry>,
    other: Vec<ListEntry>,
}

impl FreeBuckets {
    fn push(&mut self, task: &Task) {
        let entry = ListEntry::for_task(task);
        match Priority::from_str(&task.meta.priority) {
            Ok(Priority::High) => self.high.push(entry),
            Ok(Priority::Medium) => self.medium.push(entry),
            Ok(Priority::Low) => self.low.push(entry),
            Err(_) => self.other.push(entry),
        }
    }

    fn sort(&mut self) {
        for bucket in [&mut self.high, &mut self.medium, &mut self.low, &mut self.other] {
            sort_entries(bucket);
        }
    }
}

fn sort_entries(entries: &mut [ListEntry]) {
    entries.sort_by_cached_key(|entry| to_slash(&entry.path));
}

/// Whether a task belongs on any list at all.
fn is_listable(task: &Task) -> bool {
    !task.meta.completed && task.meta.is_active()
}

/// Whether every blocker of `task` exists and is resolved.
fn blockers_resolved(tasks: &TaskMap, task: &Task, ignoring: Option<&str>) -> bool {
    task.meta
        .blockers
        .iter()
        .filter(|id| Some(id.as_str()) != ignoring)
        .all(|id| tasks.get(id).is_some_and(|blocker| blocker.meta.is_resolved()))
}

/// Whether `task` belongs on the root list.
#[must_use]
pub fn is_root_task(task: &Task) -> bool {
    task.meta.parent.is_empty() && is_listable(task)
}

/// Whether `task` belongs on the free list.
///
/// A task is free when it is listable and every blocker exists and is
/// resolved. Once blockers are cleared after completion this is the same as
/// an empty blocker list. A blocker ID with no task behind it keeps the task
/// off the list until validation removes the dangling reference.
#[must_use]
pub fn is_free_task(tasks: &TaskMap, task: &Task) -> bool {
    is_listable(task) && blockers_resolved(tasks, task, None)
}

fn write_entries(out: &mut String, list_file: &Path, entries: &[ListEntry]) {
    for entry in entries {
        let _ = writeln!(out, "- [{}]({})", entry.label, list_link(list_file, &entry.path));
    }
}

fn render_list(list_file: &Path, title: &str, entries: &[ListEntry]) -> String {
    let mut out = format!("# {title}\n\n");
    write_entries(&mut out, list_file, entries);
    out
}

fn render_priority_list(list_file: &Path, title: &str, buckets: &FreeBuckets) -> String {
    let mut out = format!("# {title}\n\n");
    let mut sections = vec![("High", &buckets.high), ("Medium", &buckets.medium), ("Low", &buckets.low)];
    if !buckets.other.is_empty() {
        sections.push(("Other", &buckets.other));
    }
    for (name, entries) in sections {
        let _ = write!(out, "## {name}\n\n");
        write_entries(&mut out, list_file, entries);
        out.push('\n');
    }
    out
}

/// Render the root list as it would be written to `root_file`.
#[must_use]
pub fn render_root_list(tasks: &TaskMap, root_file: &Path) -> String {
    let mut roots: Vec<ListEntry> = tasks.values().filter(|task| is_root_task(task)).map(ListEntry::for_task).collect();
    sort_entries(&mut roots);
    render_list(root_file, ROOT_LIST_TITLE, &roots)
}

/// Render the free list as it would be written to `free_file`.
#[must_use]
pub fn render_free_list(tasks: &TaskMap, free_file: &Path) -> String {
    let mut buckets = FreeBuckets::default();
    for task in tasks.values().filter(|task| is_free_task(tasks, task)) {
        buckets.push(task);
    }
    buckets.sort();
    render_priority_list(free_file, DEFAULT_FREE_LIST_TITLE, &buckets)
}

/// Regenerate both list files from scratch.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn generate_master_lists(tasks: &TaskMap, root_file: &Path, free_file: &Path) -> Result<()> {
    write_atomic_str(root_file, &render_root_list(tasks, root_file))?;
    write_atomic_str(free_file, &render_free_list(tasks, free_file))?;
    tracing::info!(root = %root_file.display(), free = %free_file.display(), "regenerated task lists");
    Ok(())
}

/// Apply `update` to the free list in `free_file` without a full rescan.
///
/// The current file is parsed leniently and its title kept. Listed tasks
/// that were removed, no longer exist, or are no longer active are dropped;
/// the added tasks are inserted; the file is then rewritten in the same
/// layout as a full regeneration.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn update_free_list_incrementally(
    tasks: &TaskMap,
    free_file: &Path,
    update: &IncrementalFreeListUpdate,
) -> Result<()> {
    let content = std::fs::read_to_string(free_file)?;
    let parsed = parse_free_list(&content, free_file, tasks);

    let kept = parsed.ids.iter().filter(|id| !update.remove_task_ids.contains(id));
    let mut ids: Vec<&String> = kept.chain(&update.add_task_ids).collect();
    ids.sort();
    ids.dedup();

    let mut buckets = FreeBuckets::default();
    for task in ids.into_iter().filter_map(|id| tasks.get(id)).filter(|task| is_listable(task)) {
        buckets.push(task);
    }
    buckets.sort();

    write_atomic_str(free_file, &render_priority_list(free_file, &parsed.title, &buckets))?;
    tracing::info!(
        free = %free_file.display(),
        removed = update.remove_task_ids.len(),
        added = update.add_task_ids.len(),
        "updated free list"
    );
    Ok(())
}

/// Work out how the free list changes when `completed_id` finishes.
///
/// The finished task is removed. Every listable task that named it as a
/// blocker and whose other blockers are all resolved is added.
///
/// # Errors
///
/// Returns [`TaskNotFound`] if `completed_id` is not in `tasks`.
pub fn calculate_incremental_free_list_update(
    tasks: &TaskMap,
    completed_id: &str,
) -> Result<IncrementalFreeListUpdate> {
    if !tasks.contains_key(completed_id) {
        return Err(Error::task(TaskNotFound(completed_id.to_string())));
    }

    let add_task_ids = tasks
        .values()
        .filter(|task| is_listable(task))
        .filter(|task| task.meta.blockers.iter().any(|id| id == completed_id))
        .filter(|task| blockers_resolved(tasks, task, Some(completed_id)))
        .map(|task| task.id.clone())
        .collect();

    Ok(IncrementalFreeListUpdate { remove_task_ids: vec![completed_id.to_string()], add_task_ids })
}
