//! Structural checks over a loaded task tree, and the repairs that go with them.
//!
//! Checks collect every finding instead of stopping at the first, so one pass
//! reports the whole backlog. Findings are values, not errors.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tasks::id::{extract_task_id_from_path, is_valid_task_id};
use crate::tasks::loader::TaskMap;
use crate::tasks::models::{
    is_valid_priority, is_valid_status, normalize_status, InvalidPriority, InvalidStatus, Task, TodoItem, STATUS_DONE,
};
use crate::tasks::subtasks::{fix_subtask_text_titles, update_all_parent_subtasks};
use crate::traits::RoleCatalog;

/// Markdown link; group 1 is the destination.
static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]\(([^)]+)\)").unwrap());

/// One problem found in a task, or one repair applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Task the issue is about. Empty for tree-wide issues.
    pub task_id: String,
    /// File of that task.
    pub file: PathBuf,
    /// What is wrong (or what was fixed).
    pub message: String,
}

impl ValidationIssue {
    fn new(task: &Task, message: impl Into<String>) -> Self {
        Self { task_id: task.id.clone(), file: task.file_path.clone(), message: message.into() }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.task_id.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "Task {}: {}", self.task_id, self.message)
        }
    }
}

struct Checker<'a> {
    tasks: &'a TaskMap,
    roles: &'a dyn RoleCatalog,
    issues: Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn report(&mut self, task: &Task, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(task, message));
    }

    fn check_task(&mut self, task: &Task) {
        self.verify_id(task);
        self.verify_role(task);
        self.verify_priority(task);
        self.verify_status(task);
        self.verify_parent(task);
        self.verify_blockers(task);
        self.verify_links(task);
        self.verify_symmetry(task);
    }

    fn verify_id(&mut self, task: &Task) {
        if !is_valid_task_id(&task.id) {
            self.report(task, "malformed ID: must be <PREFIX><token>-<slug> (e.g., T3k7x-example)");
        }
    }

    fn verify_role(&mut self, task: &Task) {
        match task.effective_role() {
            None => self.report(task, "missing role in frontmatter and no role found in first TODO"),
            Some(role) if !self.roles.role_exists(role) => {
                let location = self.roles.describe_role(role);
                self.report(task, format!("role file {location} does not exist"));
            }
            Some(_) => {}
        }
    }

    fn verify_priority(&mut self, task: &Task) {
        if !is_valid_priority(&task.meta.priority) {
            self.report(task, InvalidPriority(task.meta.priority.clone()).to_string());
        }
    }

    /// At most one finding per task, naming both fields when they disagree.
    fn verify_status(&mut self, task: &Task) {
        let status = &task.meta.status;
        if !is_valid_status(status) {
            self.report(task, InvalidStatus(status.clone()).to_string());
            return;
        }
        let normalized = normalize_status(status);
        let completed = task.meta.completed;
        let conflict = if completed { !normalized.is_empty() && normalized != STATUS_DONE } else { normalized == STATUS_DONE };
        if conflict {
            let fix = if completed { "set status to \"done\" or completed to false" } else { "set completed to true or choose another status" };
            self.report(task, format!("completed is {completed} but status is {status:?}: {fix}"));
        }
    }

    fn verify_parent(&mut self, task: &Task) {
        let parent = &task.meta.parent;
        if !parent.is_empty() && !self.tasks.contains_key(parent) {
            self.report(task, format!("parent task {parent} does not exist"));
        }
    }

    fn verify_blockers(&mut self, task: &Task) {
        for blocker in task.meta.blockers.iter().filter(|id| !id.is_empty() && !self.tasks.contains_key(*id)) {
            self.report(task, format!("blocker task {blocker} does not exist"));
        }
        for blocked in task.meta.blocks.iter().filter(|id| !id.is_empty() && !self.tasks.contains_key(*id)) {
            self.report(task, format!("blocks non-existent task {blocked}"));
        }
    }

    fn verify_links(&mut self, task: &Task) {
        let content = linkable_content(task);
        for caps in LINK_PATTERN.captures_iter(&content) {
            let Some(target) = extract_task_id_from_path(&caps[1]) else { continue };
            if target != task.id && !self.tasks.contains_key(target) {
                self.report(task, format!("broken link: task {target} does not exist"));
            }
        }
    }

    fn verify_symmetry(&mut self, task: &Task) {
        for blocker_id in &task.meta.blockers {
            if let Some(blocker) = self.tasks.get(blocker_id) {
                if !blocker.meta.blocks.contains(&task.id) {
                    self.report(
                        task,
                        format!("task has blocker {blocker_id}, but {blocker_id} doesn't list this task in blocks field"),
                    );
                }
            }
        }
        for blocked_id in &task.meta.blocks {
            if let Some(blocked) = self.tasks.get(blocked_id) {
                if !blocked.meta.blockers.contains(&task.id) {
                    self.report(
                        task,
                        format!("task blocks {blocked_id}, but {blocked_id} doesn't list this task in blockers field"),
                    );
                }
            }
        }
    }
}

fn linkable_content(task: &Task) -> String {
    let items = task.todo_items.iter().chain(&task.subtask_items).map(TodoItem::to_markdown);
    [task.title.clone(), task.body.clone()]
        .into_iter()
        .chain(items)
        .chain([task.progress.clone(), task.other.clone()])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run every structural check without changing anything.
///
/// Checks: ID shape, role present and known, priority, status agreeing with
/// `completed`, parent exists, blockers and blocks exist, task links resolve,
/// and blocker edges are recorded on both sides.
#[must_use]
pub fn validate(tasks: &TaskMap, roles: &dyn RoleCatalog) -> Vec<ValidationIssue> {
    let mut checker = Checker { tasks, roles, issues: Vec::new() };
    for task in tasks.values() {
        checker.check_task(task);
    }
    checker.issues
}

/// Split `ids` into (existing, missing), each sorted and de-duplicated.
#[must_use]
pub fn filter_existing_task_ids(ids: &[String], tasks: &TaskMap) -> (Vec<String>, Vec<String>) {
    let (kept, missing): (BTreeSet<&String>, BTreeSet<&String>) =
        ids.iter().filter(|id| !id.is_empty()).partition(|id| tasks.contains_key(*id));
    (kept.into_iter().cloned().collect(), missing.into_iter().cloned().collect())
}

/// Strip references to tasks that do not exist.
///
/// Dangling parents are cleared and `Blockers`/`Blocks` are filtered to
/// existing IDs. Returns one notice per removed reference.
pub fn fix_missing_references(tasks: &mut TaskMap) -> Vec<ValidationIssue> {
    let existing: BTreeSet<String> = tasks.keys().cloned().collect();
    let is_known = |id: &String| existing.contains(id);
    let mut notices = Vec::new();

    for task in tasks.values_mut() {
        let mut changed = false;

        if !task.meta.parent.is_empty() && !is_known(&task.meta.parent) {
            notices.push(ValidationIssue::new(task, format!("parent task {} does not exist", task.meta.parent)));
            task.meta.parent.clear();
            changed = true;
        }

        let (blockers, missing): (BTreeSet<String>, BTreeSet<String>) =
            task.meta.blockers.iter().filter(|id| !id.is_empty()).cloned().partition(is_known);
        for blocker in &missing {
            notices.push(ValidationIssue::new(task, format!("blocker task {blocker} does not exist")));
        }
        let blockers: Vec<String> = blockers.into_iter().collect();
        if task.meta.blockers != blockers {
            task.meta.blockers = blockers;
            changed = true;
        }

        let (blocks, missing): (BTreeSet<String>, BTreeSet<String>) =
            task.meta.blocks.iter().filter(|id| !id.is_empty()).cloned().partition(is_known);
        for blocked in &missing {
            notices.push(ValidationIssue::new(task, format!("blocks non-existent task {blocked}")));
        }
        let blocks: Vec<String> = blocks.into_iter().collect();
        if task.meta.blocks != blocks {
            task.meta.blocks = blocks;
            changed = true;
        }

        if changed {
            task.mark_dirty();
        }
    }

    for notice in &notices {
        tracing::info!(task_id = %notice.task_id, "{}", notice.message);
    }
    notices
}

/// Run the strict checks, then resync every parent's subtask entries.
///
/// Subtask labels are refreshed from the child titles and each parent's
/// subtask list is rebuilt from its children. Manual TODO entries are not
/// touched.
pub fn validate_and_repair(tasks: &mut TaskMap, roles: &dyn RoleCatalog) -> Vec<ValidationIssue> {
    let issues = validate(tasks, roles);
    let relabelled = fix_subtask_text_titles(tasks);
    let rebuilt = update_all_parent_subtasks(tasks);
    tracing::info!(issues = issues.len(), relabelled, rebuilt, "validated and repaired task tree");
    issues
}
