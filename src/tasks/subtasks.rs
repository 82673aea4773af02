//! The `(subtask: ID)` entries a parent keeps for its children.
//!
//! The entries are a view of the children, not a copy. Rebuilding replaces
//! the whole list with one entry per child, sorted by child ID, ticked when
//! the child is completed and labelled with the child's current title.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::tasks::loader::TaskMap;
use crate::tasks::models::{Task, TodoItem};
use crate::tasks::resolve::TaskNotFound;

fn display_text(task: &Task) -> String {
    let title = task.title.trim();
    if title.is_empty() { task.id.clone() } else { title.to_string() }
}

/// The subtask entries `parent_id` should have.
#[must_use]
pub fn build_subtask_entries(tasks: &TaskMap, parent_id: &str) -> Vec<TodoItem> {
    tasks
        .values()
        .filter(|task| task.meta.parent == parent_id)
        .enumerate()
        .map(|(i, child)| {
            let mut item = TodoItem {
                index: i + 1,
                checked: child.meta.completed,
                subtask_id: Some(child.id.clone()),
                text: display_text(child),
                ..TodoItem::default()
            };
            item.touch();
            item
        })
        .collect()
}

fn same_entries(current: &[TodoItem], desired: &[TodoItem]) -> bool {
    current.len() == desired.len()
        && current.iter().zip(desired).all(|(a, b)| a.to_markdown() == b.to_markdown())
}

/// Replace a parent's subtask entries with the rebuilt mirror.
///
/// Returns whether the parent changed.
///
/// # Errors
///
/// Returns [`TaskNotFound`] if `parent_id` is not in `tasks`.
pub fn update_parent_subtasks(tasks: &mut TaskMap, parent_id: &str) -> Result<bool> {
    let desired = build_subtask_entries(tasks, parent_id);
    let parent = tasks.get_mut(parent_id).ok_or_else(|| Error::task(TaskNotFound(parent_id.to_string())))?;
    if same_entries(&parent.subtask_items, &desired) {
        return Ok(false);
    }
    tracing::debug!(task_id = %parent_id, entries = desired.len(), "rebuilt subtask entries");
    parent.subtask_items = desired;
    parent.mark_dirty();
    Ok(true)
}

/// Rebuild the mirror on every task that has children or stale entries.
///
/// Returns the number of tasks changed.
pub fn update_all_parent_subtasks(tasks: &mut TaskMap) -> usize {
    let parents: BTreeSet<String> = tasks
        .values()
        .filter(|task| !task.meta.parent.is_empty())
        .map(|task| task.meta.parent.clone())
        .chain(tasks.values().filter(|task| !task.subtask_items.is_empty()).map(|task| task.id.clone()))
        .filter(|id| tasks.contains_key(id))
        .collect();

    parents.iter().filter(|id| update_parent_subtasks(tasks, id).unwrap_or(false)).count()
}

/// Relabel subtask entries with the current title of the task they name.
///
/// Entries naming missing tasks are left as they are. Returns the number
/// of tasks changed.
pub fn fix_subtask_text_titles(tasks: &mut TaskMap) -> usize {
    let view: &TaskMap = tasks;
    let titles: Vec<(String, usize, String)> = view
        .values()
        .flat_map(|task| {
            task.subtask_items.iter().enumerate().filter_map(move |(i, item)| {
                let child = view.get(item.subtask_id.as_deref()?)?;
                let text = display_text(child);
                (item.text != text).then(|| (task.id.clone(), i, text))
            })
        })
        .collect();

    let mut changed = BTreeSet::new();
    for (task_id, index, text) in titles {
        if let Some(item) = tasks.get_mut(&task_id).and_then(|task| task.subtask_items.get_mut(index)) {
            item.text = text;
            item.touch();
            changed.insert(task_id);
        }
    }
    for task_id in &changed {
        if let Some(task) = tasks.get_mut(task_id) {
            task.mark_dirty();
        }
    }
    changed.len()
}
