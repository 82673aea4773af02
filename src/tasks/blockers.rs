//! Blocker edges across the whole task graph.
//!
//! `Blockers` on a task is the authoritative side of the relation; `Blocks`
//! is its mirror. The passes here recompute one side from the other or from
//! parent links, and report which tasks they touched.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::tasks::loader::TaskMap;
use crate::tasks::resolve::TaskNotFound;

/// Error when a task that must be finished is still active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStillActive(pub String);

impl std::fmt::Display for TaskStillActive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {} is still active", self.0)
    }
}

impl std::error::Error for TaskStillActive {}

/// Add `id` and leave `list` sorted and unique. Returns whether it was added.
///
/// Lists read from disk may be unsorted, so this does not assume order.
pub(crate) fn insert_sorted(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|existing| existing == id) {
        return false;
    }
    list.push(id.to_string());
    list.sort();
    list.dedup();
    true
}

/// Remove every occurrence of `id`. Returns whether anything was removed.
pub(crate) fn remove_id(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|existing| existing != id);
    list.len() != before
}

fn sorted_unique(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Whether `id` names a task that no longer holds anything up.
fn is_resolved(tasks: &TaskMap, id: &str) -> bool {
    tasks.get(id).is_some_and(|task| task.meta.is_resolved())
}

/// Child IDs by parent ID, for parents that exist.
fn children_by_parent(tasks: &TaskMap) -> BTreeMap<String, Vec<String>> {
    let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for task in tasks.values() {
        let parent = &task.meta.parent;
        if !parent.is_empty() && tasks.contains_key(parent) {
            children.entry(parent.clone()).or_default().push(task.id.clone());
        }
    }
    children
}

fn add_to_blocks(tasks: &mut TaskMap, blocker_id: &str, blocked_id: &str, modified: &mut BTreeSet<String>) {
    if let Some(blocker) = tasks.get_mut(blocker_id) {
        if insert_sorted(&mut blocker.meta.blocks, blocked_id) {
            blocker.mark_dirty();
            modified.insert(blocker_id.to_string());
        }
    }
}

fn remove_from_blocks(tasks: &mut TaskMap, blocker_id: &str, blocked_id: &str, modified: &mut BTreeSet<String>) {
    if let Some(blocker) = tasks.get_mut(blocker_id) {
        if remove_id(&mut blocker.meta.blocks, blocked_id) {
            blocker.mark_dirty();
            modified.insert(blocker_id.to_string());
        }
    }
}

pub(crate) fn sync_from_children(tasks: &mut TaskMap) -> BTreeSet<String> {
    let mut modified = BTreeSet::new();

    for (parent_id, children) in children_by_parent(tasks) {
        let Some(parent) = tasks.get(&parent_id) else { continue };
        if parent.meta.completed {
            continue;
        }

        let external = parent.meta.blockers.iter().filter(|id| !children.contains(id)).cloned();
        let open_children = children.iter().filter(|id| !is_resolved(tasks, id)).cloned();
        let desired = sorted_unique(external.chain(open_children));
        let dropped: Vec<String> =
            parent.meta.blockers.iter().filter(|id| !desired.contains(id)).cloned().collect();

        if parent.meta.blockers != desired {
            tracing::debug!(
                task_id = %parent_id,
                before = ?parent.meta.blockers,
                after = ?desired,
                "recomputed blockers from children"
            );
            if let Some(parent) = tasks.get_mut(&parent_id) {
                parent.meta.blockers.clone_from(&desired);
                parent.mark_dirty();
                modified.insert(parent_id.clone());
            }
        }

        for id in &dropped {
            remove_from_blocks(tasks, id, &parent_id, &mut modified);
        }
        for child in children.iter().filter(|id| desired.contains(id)) {
            add_to_blocks(tasks, child, &parent_id, &mut modified);
        }
    }

    modified
}

pub(crate) fn after_completion(tasks: &mut TaskMap, task_id: &str) -> Result<BTreeSet<String>> {
    let task = tasks.get(task_id).ok_or_else(|| Error::task(TaskNotFound(task_id.to_string())))?;
    if task.meta.is_active() && !task.meta.completed {
        return Err(Error::task(TaskStillActive(task_id.to_string())));
    }

    let mut freed: Vec<String> = task.meta.blocks.clone();
    if !task.meta.parent.is_empty() {
        freed.push(task.meta.parent.clone());
    }

    let mut modified = BTreeSet::new();
    for id in &freed {
        if let Some(blocked) = tasks.get_mut(id) {
            if remove_id(&mut blocked.meta.blockers, task_id) {
                blocked.mark_dirty();
                modified.insert(id.clone());
            }
        }
    }

    if let Some(task) = tasks.get_mut(task_id) {
        if !task.meta.blocks.is_empty() {
            task.meta.blocks.clear();
            task.mark_dirty();
            modified.insert(task_id.to_string());
        }
    }

    tracing::debug!(task_id, freed = ?modified, "released blockers after completion");
    Ok(modified)
}

pub(crate) fn fix_relationships(tasks: &mut TaskMap) -> BTreeSet<String> {
    let mut desired_blocks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for task in tasks.values() {
        for blocker in &task.meta.blockers {
            if tasks.contains_key(blocker) {
                desired_blocks.entry(blocker.clone()).or_default().insert(task.id.clone());
            }
        }
    }

    let mut modified = BTreeSet::new();
    for (id, task) in tasks.iter_mut() {
        let blockers = sorted_unique(task.meta.blockers.iter().filter(|b| !b.is_empty()).cloned());
        let blocks: Vec<String> = desired_blocks.remove(id).unwrap_or_default().into_iter().collect();

        if task.meta.blockers != blockers || task.meta.blocks != blocks {
            tracing::debug!(
                task_id = %id,
                before = ?task.meta.blocks,
                after = ?blocks,
                "rebuilt blocks from blockers"
            );
            task.meta.blockers = blockers;
            task.meta.blocks = blocks;
            task.mark_dirty();
            modified.insert(id.clone());
        }
    }
    modified
}

/// Re-block parents on their open children and free them as children finish.
///
/// A parent's blockers become its non-child blockers plus every child that
/// is not yet resolved. Completed parents are left alone. The affected
/// children's `Blocks` lists are updated to match.
///
/// Returns the number of tasks modified.
pub fn sync_blockers_from_children(tasks: &mut TaskMap) -> usize {
    sync_from_children(tasks).len()
}

/// Remove a finished task from everything it was blocking.
///
/// The task is dropped from the `Blockers` of each task in its `Blocks` and
/// of its parent, and its own `Blocks` is cleared.
///
/// Returns the number of tasks modified.
///
/// # Errors
///
/// Returns [`TaskNotFound`] if the task is not in `tasks`, and
/// [`TaskStillActive`] if it is neither completed nor inactive.
pub fn update_blockers_after_completion(tasks: &mut TaskMap, task_id: &str) -> Result<usize> {
    after_completion(tasks, task_id).map(|modified| modified.len())
}

/// Rebuild every `Blocks` list from the `Blockers` lists that name it.
///
/// `Blockers` lists are sorted and de-duplicated along the way. Entries
/// naming missing tasks are kept in `Blockers` (validation reports them)
/// but never produce a `Blocks` entry.
///
/// Returns the number of tasks modified.
pub fn fix_blocker_relationships(tasks: &mut TaskMap) -> usize {
    fix_relationships(tasks).len()
}

/// Sync parent blockers from children, then restore blocker symmetry.
///
/// Returns the number of distinct tasks modified.
pub fn reconcile_blocker_relationships(tasks: &mut TaskMap) -> usize {
    let mut modified = sync_from_children(tasks);
    modified.extend(fix_relationships(tasks));
    modified.len()
}
