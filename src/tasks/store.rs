//! The task store: loaded tasks plus every mutation over them.
//!
//! Mutators keep the graph invariants: parent links never form a cycle, and a
//! blocker edge is always recorded on both tasks. Each mutator either applies
//! completely or returns an error without changing anything. Changes stay in
//! memory, marked dirty, until one of the save methods writes them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::activity::ActivityLogFile;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::roles::DirRoleCatalog;
use crate::storage::write_atomic_str;
use crate::tasks::blockers::{self, insert_sorted, remove_id};
use crate::tasks::id::{generate_unique_id, short_id};
use crate::tasks::loader::{load_tasks_with_concurrency, task_file_in, TaskMap, DEFAULT_CONCURRENCY};
use crate::tasks::models::{
    is_valid_status, normalize_status, InvalidStatus, Priority, Task, TodoItem, STATUS_CANCELLED, STATUS_DONE,
    STATUS_DUPLICATE, STATUS_IN_PROGRESS,
};
use crate::tasks::parser::{parse_file, parse_items};
use crate::tasks::resolve::{resolve_task_id, TaskNotFound};
use crate::tasks::subtasks;
use crate::tasks::validate::{self, ValidationIssue};
use crate::traits::{CompletionLog, RoleCatalog};

/// Error when a parent link would make a task its own ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularParent {
    /// The task whose parent was being set.
    pub child: String,
    /// The parent that was refused.
    pub parent: String,
}

impl std::fmt::Display for CircularParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "setting parent of {} to {} would create a cycle", self.child, self.parent)
    }
}

impl std::error::Error for CircularParent {}

/// Which relation a self-reference was attempted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `parent`
    Parent,
    /// `blockers` / `blocks`
    Blocker,
}

/// Error when a task would be linked to itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReference {
    /// The task.
    pub id: String,
    /// The relation.
    pub relation: Relation,
}

impl std::fmt::Display for SelfReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.relation {
            Relation::Parent => write!(f, "task {} cannot be its own parent", self.id),
            Relation::Blocker => write!(f, "task {} cannot block itself", self.id),
        }
    }
}

impl std::error::Error for SelfReference {}

/// Error when a 1-based item number is outside a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoIndexOutOfRange {
    /// The number given.
    pub index: usize,
    /// How many items the list has.
    pub len: usize,
    /// `todo` or `subtask`.
    pub list: &'static str,
}

impl std::fmt::Display for TodoIndexOutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} number {}, task has {} {} items", self.list, self.index, self.len, self.list)
    }
}

impl std::error::Error for TodoIndexOutOfRange {}

/// Error when completing a task that is already completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyCompleted(pub String);

impl std::fmt::Display for AlreadyCompleted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {} is already completed", self.0)
    }
}

impl std::error::Error for AlreadyCompleted {}

/// Error when text cannot become a single TODO entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTodoText(pub String);

impl std::fmt::Display for InvalidTodoText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid todo text {:?}: must be a single line and not a subtask entry", self.0)
    }
}

impl std::error::Error for InvalidTodoText {}

/// Outcome of ticking a TODO entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteTodoResult {
    /// Whether this tick completed the task.
    pub task_completed: bool,
    /// Entries still unticked.
    pub remaining_incomplete: usize,
}

fn not_found(id: &str) -> Error {
    Error::task(TaskNotFound(id.to_string()))
}

/// Zero-based slot for a 1-based item `number` in a list of `len` items.
fn slot(number: usize, len: usize, list: &'static str) -> Result<usize> {
    if number == 0 || number > len {
        return Err(Error::task(TodoIndexOutOfRange { index: number, len, list }));
    }
    Ok(number - 1)
}

fn todo_from_text(text: &str) -> Result<TodoItem> {
    let text = text.trim();
    if text.contains('\n') {
        return Err(Error::task(InvalidTodoText(text.to_string())));
    }
    let mut parsed = parse_items(&format!("- [ ] {text}"));
    if parsed.todos.len() != 1 {
        return Err(Error::task(InvalidTodoText(text.to_string())));
    }
    Ok(parsed.todos.remove(0))
}

fn move_item(items: &mut Vec<TodoItem>, from: usize, to: usize) {
    let item = items.remove(from);
    items.insert(to, item);
}

fn write_task(task: &mut Task) -> Result<()> {
    let content = task.content()?;
    write_atomic_str(&task.file_path, &content)?;
    task.dirty = false;
    tracing::debug!(task_id = %task.id, path = %task.file_path.display(), "saved task");
    Ok(())
}

/// Loaded tasks under one tasks root.
///
/// Tasks are loaded lazily on first access. Not safe to share between
/// threads; use one store per command.
pub struct TaskStore {
    tasks_root: PathBuf,
    tasks: TaskMap,
    roles: Box<dyn RoleCatalog>,
    completions: Option<Box<dyn CompletionLog>>,
    concurrency: usize,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks_root", &self.tasks_root)
            .field("loaded", &self.tasks.len())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    /// Create a store over `tasks_root` checking roles against `roles`.
    pub fn new(tasks_root: impl Into<PathBuf>, roles: Box<dyn RoleCatalog>) -> Self {
        Self {
            tasks_root: tasks_root.into(),
            tasks: TaskMap::new(),
            roles,
            completions: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Create a store for the project at `base_dir` as described by `config`.
    #[must_use]
    pub fn from_config(base_dir: &Path, config: &StoreConfig) -> Self {
        let paths = config.resolve(base_dir);
        Self::new(paths.tasks_dir, Box::new(DirRoleCatalog::new(paths.roles_dir)))
            .with_completion_log(Box::new(ActivityLogFile::new(paths.activity_log)))
            .with_concurrency(config.load_concurrency)
    }

    /// Read completion counts from `log`.
    #[must_use]
    pub fn with_completion_log(mut self, log: Box<dyn CompletionLog>) -> Self {
        self.completions = Some(log);
        self
    }

    /// Parse at most `concurrency` files at once when loading the tree.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Root directory of the task tree.
    #[must_use]
    pub fn tasks_root(&self) -> &Path {
        &self.tasks_root
    }

    // --- Loading ----------------------------------------------------------

    /// Parse the task stored directly under the root, if there is one.
    fn load_direct(&self, id: &str) -> Result<Option<Task>> {
        let plain = !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\']);
        if !plain {
            return Ok(None);
        }
        let Some(path) = task_file_in(&self.tasks_root.join(id)) else {
            return Ok(None);
        };
        parse_file(&path)
            .map(Some)
            .map_err(|source| Error::TaskFile { path, source: Box::new(source) })
    }

    /// Add tasks from disk that are not already cached. Cached copies win.
    fn merge_from_disk(&mut self) -> Result<()> {
        if !self.tasks_root.is_dir() {
            return Ok(());
        }
        let on_disk = load_tasks_with_concurrency(&self.tasks_root, self.concurrency)?;
        for (id, task) in on_disk {
            self.tasks.entry(id).or_insert(task);
        }
        Ok(())
    }

    fn ensure_loaded(&mut self, id: &str) -> Result<()> {
        if self.tasks.contains_key(id) {
            return Ok(());
        }
        if let Some(task) = self.load_direct(id)? {
            self.tasks.insert(id.to_string(), task);
            return Ok(());
        }
        self.merge_from_disk()?;
        if self.tasks.contains_key(id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// Parent of `id`, loading it if needed. Empty when `id` does not exist.
    fn parent_of(&mut self, id: &str) -> Result<String> {
        match self.ensure_loaded(id) {
            Ok(()) => Ok(self.tasks.get(id).map(|task| task.meta.parent.clone()).unwrap_or_default()),
            Err(err) if err.task_error::<TaskNotFound>().is_some() => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.ensure_loaded(id)?;
        self.tasks.get_mut(id).ok_or_else(|| not_found(id))
    }

    /// Get a task, loading it if it is not cached.
    ///
    /// Looks in the cache, then at `<root>/<id>/<id>.md` and
    /// `<root>/<id>/task.md`, then loads the whole tree for nested tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] if no such task exists, or the load error.
    pub fn get(&mut self, id: &str) -> Result<&Task> {
        self.ensure_loaded(id)?;
        self.tasks.get(id).ok_or_else(|| not_found(id))
    }

    /// Re-read a task from disk, discarding any unsaved changes to it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] if no such task exists, or the parse error.
    pub fn load(&mut self, id: &str) -> Result<&Task> {
        if let Some(path) = self.tasks.remove(id).map(|task| task.file_path).filter(|path| path.is_file()) {
            let task = parse_file(&path).map_err(|source| Error::TaskFile { path, source: Box::new(source) })?;
            self.tasks.insert(id.to_string(), task);
        }
        self.get(id)
    }

    /// Replace the cache with a fresh load of the whole tree.
    ///
    /// Returns the number of tasks loaded. Unsaved changes are discarded.
    ///
    /// # Errors
    ///
    /// Returns the first walk or parse error.
    pub fn load_all(&mut self) -> Result<usize> {
        self.tasks = load_tasks_with_concurrency(&self.tasks_root, self.concurrency)?;
        Ok(self.tasks.len())
    }

    /// Load the whole tree unless something is already cached.
    ///
    /// # Errors
    ///
    /// Returns the first walk or parse error.
    pub fn load_all_if_empty(&mut self) -> Result<()> {
        if self.tasks.is_empty() {
            self.load_all()?;
        }
        Ok(())
    }

    /// Every cached task.
    #[must_use]
    pub fn get_all(&self) -> &TaskMap {
        &self.tasks
    }

    /// Whether `id` is cached.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// The task file as it is on disk.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] or the read error.
    pub fn read_raw(&mut self, id: &str) -> Result<String> {
        let path = self.get(id)?.file_path.clone();
        Ok(std::fs::read_to_string(path)?)
    }

    /// Get a task, or start a new empty one at `<root>/<id>/<id>.md`.
    ///
    /// A new task is dirty and is not written until saved.
    ///
    /// # Errors
    ///
    /// Returns load errors other than the task not existing.
    pub fn get_or_create(&mut self, id: &str) -> Result<&Task> {
        match self.ensure_loaded(id) {
            Ok(()) => {}
            Err(err) if err.task_error::<TaskNotFound>().is_some() => {
                let path = self.tasks_root.join(id).join(format!("{id}.md"));
                let mut task = Task::new(id, path);
                task.meta.date_created = Some(Utc::now());
                task.mark_dirty();
                tracing::info!(task_id = %id, "created task in memory");
                self.tasks.insert(id.to_string(), task);
            }
            Err(err) => return Err(err),
        }
        self.get(id)
    }

    /// Start a new task with a fresh ID under `prefix`, titled `title`.
    ///
    /// Returns the new ID. The task is dirty and not yet written.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be loaded or no ID can be made.
    pub fn create_task(&mut self, prefix: &str, title: &str) -> Result<String> {
        self.load_all_if_empty()?;
        let id = generate_unique_id(prefix, title, self.tasks.keys())?;
        self.get_or_create(&id)?;
        self.task_mut(&id)?.set_title(title);
        Ok(id)
    }

    // --- Saving -----------------------------------------------------------

    /// Write one task if it is dirty. Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] if the task is not cached, or the write error.
    pub fn save(&mut self, id: &str) -> Result<bool> {
        let task = self.tasks.get_mut(id).ok_or_else(|| not_found(id))?;
        if !task.dirty {
            return Ok(false);
        }
        write_task(task)?;
        Ok(true)
    }

    /// Write every dirty task. Returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns the first write error. Tasks written before it stay written.
    pub fn save_dirty(&mut self) -> Result<usize> {
        let mut written = 0;
        for task in self.tasks.values_mut().filter(|task| task.dirty) {
            write_task(task)?;
            written += 1;
        }
        Ok(written)
    }

    /// Write every cached task. Returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn save_all(&mut self) -> Result<usize> {
        for task in self.tasks.values_mut() {
            write_task(task)?;
        }
        Ok(self.tasks.len())
    }

    // --- Parents ----------------------------------------------------------

    /// Make `parent_id` the parent of `child_id`. An empty parent clears it.
    ///
    /// # Errors
    ///
    /// Returns [`SelfReference`] or [`CircularParent`] if the link would make
    /// a task its own ancestor, and [`TaskNotFound`] for unknown tasks.
    pub fn set_parent(&mut self, child_id: &str, parent_id: &str) -> Result<()> {
        if parent_id.is_empty() {
            return self.clear_parent(child_id);
        }
        if child_id == parent_id {
            return Err(Error::task(SelfReference { id: child_id.to_string(), relation: Relation::Parent }));
        }
        self.ensure_loaded(child_id)?;
        self.ensure_loaded(parent_id)?;

        // Walk up from the new parent; the seen set stops on existing cycles.
        let mut seen = BTreeSet::new();
        let mut current = parent_id.to_string();
        while !current.is_empty() && seen.insert(current.clone()) {
            if current == child_id {
                return Err(Error::task(CircularParent {
                    child: child_id.to_string(),
                    parent: parent_id.to_string(),
                }));
            }
            current = self.parent_of(&current)?;
        }

        let child = self.task_mut(child_id)?;
        if child.meta.parent != parent_id {
            child.meta.parent = parent_id.to_string();
            child.mark_dirty();
        }
        Ok(())
    }

    /// Remove the parent of `child_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn clear_parent(&mut self, child_id: &str) -> Result<()> {
        let child = self.task_mut(child_id)?;
        if !child.meta.parent.is_empty() {
            child.meta.parent.clear();
            child.mark_dirty();
        }
        Ok(())
    }

    /// Cached tasks whose parent is `parent_id`, sorted by ID.
    #[must_use]
    pub fn get_children(&self, parent_id: &str) -> Vec<&Task> {
        self.tasks.values().filter(|task| task.meta.parent == parent_id).collect()
    }

    /// `(short ID, title)` of each ancestor, nearest first.
    #[must_use]
    pub fn get_ancestors(&self, id: &str) -> Vec<(String, String)> {
        let mut ancestors = Vec::new();
        let mut seen = BTreeSet::from([id.to_string()]);
        let mut current = self.tasks.get(id).map(|task| task.meta.parent.clone()).unwrap_or_default();
        while let Some(parent) = self.tasks.get(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            ancestors.push((short_id(&parent.id), parent.title.clone()));
            current = parent.meta.parent.clone();
        }
        ancestors
    }

    // --- IDs --------------------------------------------------------------

    /// Resolve a full ID, short ID, prefix, or path to a task ID.
    ///
    /// # Errors
    ///
    /// See [`resolve_task_id`].
    pub fn resolve_id(&mut self, input: &str) -> Result<String> {
        self.load_all_if_empty()?;
        resolve_task_id(&self.tasks, input)
    }

    /// Resolve several inputs. The result is sorted and de-duplicated.
    ///
    /// # Errors
    ///
    /// Returns the first resolution error.
    pub fn resolve_ids<S: AsRef<str>>(&mut self, inputs: &[S]) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.load_all_if_empty()?;
        let resolved = inputs
            .iter()
            .map(|input| resolve_task_id(&self.tasks, input.as_ref()))
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(resolved.into_iter().collect())
    }

    /// Resolve `input` and return the task.
    ///
    /// # Errors
    ///
    /// See [`resolve_task_id`].
    pub fn get_resolved(&mut self, input: &str) -> Result<&Task> {
        let id = self.resolve_id(input)?;
        self.get(&id)
    }

    // --- Blockers ---------------------------------------------------------

    /// Record that `blocker_id` blocks `task_id`, on both tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SelfReference`] when both are the same task and
    /// [`TaskNotFound`] for unknown tasks.
    pub fn add_blocker(&mut self, task_id: &str, blocker_id: &str) -> Result<()> {
        if task_id == blocker_id {
            return Err(Error::task(SelfReference { id: task_id.to_string(), relation: Relation::Blocker }));
        }
        self.ensure_loaded(task_id)?;
        self.ensure_loaded(blocker_id)?;

        let task = self.task_mut(task_id)?;
        if insert_sorted(&mut task.meta.blockers, blocker_id) {
            task.mark_dirty();
        }
        let blocker = self.task_mut(blocker_id)?;
        if insert_sorted(&mut blocker.meta.blocks, task_id) {
            blocker.mark_dirty();
        }
        Ok(())
    }

    /// Remove the blocker edge between `task_id` and `blocker_id`.
    ///
    /// A blocker that no longer exists is still removed from `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] if `task_id` is unknown.
    pub fn remove_blocker(&mut self, task_id: &str, blocker_id: &str) -> Result<()> {
        let task = self.task_mut(task_id)?;
        if remove_id(&mut task.meta.blockers, blocker_id) {
            task.mark_dirty();
        }
        match self.task_mut(blocker_id) {
            Ok(blocker) => {
                if remove_id(&mut blocker.meta.blocks, task_id) {
                    blocker.mark_dirty();
                }
                Ok(())
            }
            Err(err) if err.task_error::<TaskNotFound>().is_some() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Record that `task_id` blocks `blocked_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::add_blocker`].
    pub fn add_blocked(&mut self, task_id: &str, blocked_id: &str) -> Result<()> {
        self.add_blocker(blocked_id, task_id)
    }

    /// Remove the edge where `task_id` blocks `blocked_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::remove_blocker`].
    pub fn remove_blocked(&mut self, task_id: &str, blocked_id: &str) -> Result<()> {
        self.remove_blocker(blocked_id, task_id)
    }

    /// See [`blockers::sync_blockers_from_children`].
    pub fn sync_blockers_from_children(&mut self) -> usize {
        blockers::sync_blockers_from_children(&mut self.tasks)
    }

    /// See [`blockers::update_blockers_after_completion`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] or [`blockers::TaskStillActive`].
    pub fn update_blockers_after_completion(&mut self, task_id: &str) -> Result<usize> {
        self.ensure_loaded(task_id)?;
        blockers::update_blockers_after_completion(&mut self.tasks, task_id)
    }

    /// See [`blockers::fix_blocker_relationships`].
    pub fn fix_blocker_relationships(&mut self) -> usize {
        blockers::fix_blocker_relationships(&mut self.tasks)
    }

    /// See [`blockers::reconcile_blocker_relationships`].
    pub fn reconcile_blocker_relationships(&mut self) -> usize {
        blockers::reconcile_blocker_relationships(&mut self.tasks)
    }

    // --- Status -----------------------------------------------------------

    /// Set `completed`, moving `status` to `done` or back to `open`.
    ///
    /// Blocker lists are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn set_completed(&mut self, task_id: &str, completed: bool) -> Result<()> {
        let task = self.task_mut(task_id)?;
        if task.meta.set_completed(completed) {
            task.mark_dirty();
        }
        Ok(())
    }

    /// Set the status and bring `completed` along.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStatus`] for an unknown status and [`TaskNotFound`]
    /// for an unknown task.
    pub fn set_status(&mut self, task_id: &str, status: &str) -> Result<()> {
        if !is_valid_status(status) {
            return Err(Error::task(InvalidStatus(status.to_string())));
        }
        let normalized = normalize_status(status);
        let task = self.task_mut(task_id)?;
        if task.meta.status != normalized {
            if normalized == STATUS_DONE {
                task.meta.completed = true;
            } else if !normalized.is_empty() {
                task.meta.completed = false;
            }
            task.meta.status = normalized;
            task.mark_dirty();
        }
        Ok(())
    }

    /// Set the status, append `report` if given, and release blockers when
    /// the new status is terminal.
    ///
    /// # Errors
    ///
    /// See [`Self::set_status`].
    pub fn set_status_with_report(&mut self, task_id: &str, status: &str, report: &str) -> Result<()> {
        self.set_status(task_id, status)?;
        self.append_completion_report(task_id, report)?;
        let normalized = normalize_status(status);
        if [STATUS_DONE, STATUS_CANCELLED, STATUS_DUPLICATE].contains(&normalized.as_str()) {
            self.update_blockers_after_completion(task_id)?;
        }
        Ok(())
    }

    /// Mark a task cancelled, recording `reason` if given.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn cancel_task(&mut self, task_id: &str, reason: &str) -> Result<()> {
        self.set_status(task_id, STATUS_CANCELLED)?;
        if reason.is_empty() {
            return Ok(());
        }
        self.append_completion_report(task_id, &format!("Cancelled: {reason}"))
    }

    /// Mark a task as a duplicate, of `duplicate_of` if given.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn mark_duplicate(&mut self, task_id: &str, duplicate_of: &str) -> Result<()> {
        self.set_status(task_id, STATUS_DUPLICATE)?;
        let report = if duplicate_of.is_empty() {
            "Marked as duplicate".to_string()
        } else {
            format!("Marked as duplicate of {duplicate_of}")
        };
        self.append_completion_report(task_id, &report)
    }

    /// Mark a task in progress.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn mark_in_progress(&mut self, task_id: &str) -> Result<()> {
        self.set_status(task_id, STATUS_IN_PROGRESS)
    }

    /// Claim a task for work, marking it in progress.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn claim_task(&mut self, task_id: &str) -> Result<()> {
        self.set_status_with_report(task_id, STATUS_IN_PROGRESS, "")
    }

    /// Complete a task and append `report` if given.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyCompleted`] if it was already completed, with no
    /// change made.
    pub fn complete_task(&mut self, task_id: &str, report: &str) -> Result<()> {
        if self.get(task_id)?.meta.completed {
            return Err(Error::task(AlreadyCompleted(task_id.to_string())));
        }
        self.set_completed(task_id, true)?;
        self.append_completion_report(task_id, report)
    }

    /// Append a `## Completion Report` section. Empty reports are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn append_completion_report(&mut self, task_id: &str, report: &str) -> Result<()> {
        let task = self.task_mut(task_id)?;
        if report.is_empty() {
            return Ok(());
        }
        if !task.other.is_empty() {
            task.other.push_str("\n\n");
        }
        task.other.push_str("## Completion Report\n");
        task.other.push_str(report);
        task.mark_dirty();
        Ok(())
    }

    /// Completions of `task_id` (or of any task) since `since`.
    ///
    /// A store without a completion log reports none.
    ///
    /// # Errors
    ///
    /// Returns the log's read error.
    pub fn count_completions_since(&self, task_id: Option<&str>, since: DateTime<Utc>) -> Result<usize> {
        self.completions.as_ref().map_or(Ok(0), |log| log.count_completions_since(task_id, since))
    }

    // --- TODOs ------------------------------------------------------------

    /// Append a TODO entry. Text may start with `(role: name)`.
    ///
    /// A completed task becomes incomplete again.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTodoText`] for multi-line or subtask text and
    /// [`TaskNotFound`] for an unknown task.
    pub fn add_todo(&mut self, task_id: &str, text: &str) -> Result<()> {
        let item = todo_from_text(text)?;
        let task = self.task_mut(task_id)?;
        task.todo_items.push(item);
        task.renumber();
        task.meta.set_completed(false);
        task.mark_dirty();
        Ok(())
    }

    /// Replace the text of TODO `number`, keeping its tick and report.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`], [`InvalidTodoText`], or [`TaskNotFound`].
    pub fn edit_todo(&mut self, task_id: &str, number: usize, text: &str) -> Result<()> {
        let mut item = todo_from_text(text)?;
        let task = self.task_mut(task_id)?;
        let idx = slot(number, task.todo_items.len(), "todo")?;
        let old = &task.todo_items[idx];
        item.checked = old.checked;
        item.report.clone_from(&old.report);
        item.touch();
        task.todo_items[idx] = item;
        task.renumber();
        task.mark_dirty();
        Ok(())
    }

    /// Remove TODO `number`.
    ///
    /// If every remaining entry is ticked, an active task becomes completed.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`] or [`TaskNotFound`].
    pub fn remove_todo(&mut self, task_id: &str, number: usize) -> Result<()> {
        let task = self.task_mut(task_id)?;
        let idx = slot(number, task.todo_items.len(), "todo")?;
        task.todo_items.remove(idx);
        task.renumber();
        if !task.meta.completed
            && task.meta.is_active()
            && !task.todo_items.is_empty()
            && task.incomplete_todo_count() == 0
        {
            task.meta.set_completed(true);
        }
        task.mark_dirty();
        Ok(())
    }

    /// Move TODO `from` to position `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`] or [`TaskNotFound`].
    pub fn reorder_todo(&mut self, task_id: &str, from: usize, to: usize) -> Result<()> {
        let task = self.task_mut(task_id)?;
        let len = task.todo_items.len();
        let (from, to) = (slot(from, len, "todo")?, slot(to, len, "todo")?);
        if from == to {
            return Ok(());
        }
        move_item(&mut task.todo_items, from, to);
        task.renumber();
        task.mark_dirty();
        Ok(())
    }

    /// Tick TODO `number`, attaching `report` if given.
    ///
    /// Ticking the last open entry completes the task. Ticking an entry that
    /// is already ticked changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`] or [`TaskNotFound`].
    pub fn complete_todo(&mut self, task_id: &str, number: usize, report: &str) -> Result<CompleteTodoResult> {
        let task = self.task_mut(task_id)?;
        let idx = slot(number, task.todo_items.len(), "todo")?;
        if task.todo_items[idx].checked {
            return Ok(CompleteTodoResult { task_completed: false, remaining_incomplete: task.incomplete_todo_count() });
        }

        let item = &mut task.todo_items[idx];
        item.checked = true;
        if !report.is_empty() {
            item.report = Some(report.to_string());
        }
        item.touch();

        let remaining = task.incomplete_todo_count();
        if remaining == 0 {
            task.meta.set_completed(true);
        }
        task.mark_dirty();
        Ok(CompleteTodoResult { task_completed: remaining == 0, remaining_incomplete: remaining })
    }

    /// Untick TODO `number`. A completed task becomes incomplete again.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`] or [`TaskNotFound`].
    pub fn uncheck_todo(&mut self, task_id: &str, number: usize) -> Result<()> {
        let task = self.task_mut(task_id)?;
        let idx = slot(number, task.todo_items.len(), "todo")?;
        if !task.todo_items[idx].checked {
            return Ok(());
        }
        task.todo_items[idx].checked = false;
        task.todo_items[idx].touch();
        task.meta.set_completed(false);
        task.mark_dirty();
        Ok(())
    }

    /// TODO entries not yet ticked.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn get_incomplete_todos(&mut self, task_id: &str) -> Result<Vec<TodoItem>> {
        Ok(self.get(task_id)?.todo_items.iter().filter(|item| !item.checked).cloned().collect())
    }

    // --- Fields -----------------------------------------------------------

    /// Set the front matter role.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn set_role(&mut self, task_id: &str, role: &str) -> Result<()> {
        let task = self.task_mut(task_id)?;
        if task.meta.role != role {
            task.meta.role = role.to_string();
            task.mark_dirty();
        }
        Ok(())
    }

    /// Set the priority. Empty means medium.
    ///
    /// # Errors
    ///
    /// Returns [`crate::tasks::models::InvalidPriority`] for an unknown
    /// priority and [`TaskNotFound`] for an unknown task.
    pub fn set_priority(&mut self, task_id: &str, priority: &str) -> Result<()> {
        let priority = Priority::from_str(priority).map_err(Error::task)?;
        let task = self.task_mut(task_id)?;
        if task.meta.priority != priority.as_str() {
            task.meta.priority = priority.as_str().to_string();
            task.mark_dirty();
        }
        Ok(())
    }

    /// Set the title.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn set_title(&mut self, task_id: &str, title: &str) -> Result<()> {
        self.task_mut(task_id)?.set_title(title);
        Ok(())
    }

    /// Set the body. A title heading or list sections in `body` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task.
    pub fn set_body(&mut self, task_id: &str, body: &str) -> Result<()> {
        self.task_mut(task_id)?.set_body(body);
        Ok(())
    }

    // --- Subtasks ---------------------------------------------------------

    /// Rebuild a parent's subtask entries from its children.
    ///
    /// Returns whether the parent changed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown parent or load errors.
    pub fn update_parent_subtasks(&mut self, parent_id: &str) -> Result<bool> {
        self.ensure_loaded(parent_id)?;
        // Children can live anywhere in the tree.
        self.merge_from_disk()?;
        subtasks::update_parent_subtasks(&mut self.tasks, parent_id)
    }

    /// Rebuild the subtask entries of `child_id`'s parent, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskNotFound`] for an unknown task or parent.
    pub fn update_parent_subtasks_for_child(&mut self, child_id: &str) -> Result<bool> {
        let parent = self.get(child_id)?.meta.parent.clone();
        if parent.is_empty() {
            return Ok(false);
        }
        self.update_parent_subtasks(&parent)
    }

    /// Move subtask entry `from` to position `to`.
    ///
    /// The order lasts until the list is next rebuilt from the children.
    ///
    /// # Errors
    ///
    /// Returns [`TodoIndexOutOfRange`] or [`TaskNotFound`].
    pub fn reorder_subtask(&mut self, parent_id: &str, from: usize, to: usize) -> Result<()> {
        let parent = self.task_mut(parent_id)?;
        let len = parent.subtask_items.len();
        let (from, to) = (slot(from, len, "subtask")?, slot(to, len, "subtask")?);
        if from == to {
            return Ok(());
        }
        move_item(&mut parent.subtask_items, from, to);
        parent.renumber();
        parent.mark_dirty();
        Ok(())
    }

    // --- Validation -------------------------------------------------------

    /// Strict structural checks. Changes nothing.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate::validate(&self.tasks, self.roles.as_ref())
    }

    /// Strip references to missing tasks. Returns one notice per reference.
    pub fn fix_missing_references(&mut self) -> Vec<ValidationIssue> {
        validate::fix_missing_references(&mut self.tasks)
    }

    /// Strict checks plus subtask entry repair.
    pub fn validate_and_repair(&mut self) -> Vec<ValidationIssue> {
        validate::validate_and_repair(&mut self.tasks, self.roles.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::blockers::TaskStillActive;
    use crate::tasks::id::{disable_deterministic_ids, enable_deterministic_ids};
    use crate::tasks::models::{InvalidPriority, STATUS_OPEN};
    use crate::tasks::resolve::AmbiguousReference;
    use crate::testing::{FailingCompletionLog, MockCompletionLog, MockRoleCatalog};
    use chrono::TimeZone;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, TaskStore) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tasks");
        fs::create_dir_all(&root).unwrap();
        let store = TaskStore::new(root, Box::new(MockRoleCatalog::with_roles(&["developer"])));
        (dir, store)
    }

    fn write_task_file(store: &TaskStore, rel_dir: &str, front_matter: &str, body: &str) {
        let dir = store.tasks_root().join(rel_dir);
        fs::create_dir_all(&dir).unwrap();
        let id = dir.file_name().unwrap().to_string_lossy().into_owned();
        fs::write(dir.join(format!("{id}.md")), format!("---\n{front_matter}---\n\n{body}")).unwrap();
    }

    fn simple(store: &TaskStore, id: &str) {
        write_task_file(store, id, "role: developer\n", &format!("# {id}\n"));
    }

    fn store_with(ids: &[&str]) -> (TempDir, TaskStore) {
        let (dir, mut store) = create_test_store();
        for id in ids {
            simple(&store, id);
        }
        store.load_all().unwrap();
        (dir, store)
    }

    #[test]
    fn test_get_loads_lazily() {
        let (_dir, mut store) = create_test_store();
        simple(&store, "T1aaaa-one");
        write_task_file(&store, "E2bbbb-epic/T3cccc-nested", "role: developer\n", "# Nested\n");

        assert!(!store.has("T1aaaa-one"));
        assert_eq!(store.get("T1aaaa-one").unwrap().title, "T1aaaa-one");
        assert!(store.has("T1aaaa-one"));
        assert_eq!(store.get("T3cccc-nested").unwrap().title, "Nested");

        let err = store.get("T9zzzz-missing").unwrap_err();
        assert_eq!(err.task_error::<TaskNotFound>(), Some(&TaskNotFound("T9zzzz-missing".to_string())));
    }

    #[test]
    fn test_get_keeps_unsaved_changes_when_loading_more() {
        let (_dir, mut store) = create_test_store();
        simple(&store, "T1aaaa-one");
        write_task_file(&store, "E2bbbb-epic/T3cccc-nested", "role: developer\n", "# Nested\n");
        store.set_title("T1aaaa-one", "Edited").unwrap();

        store.get("T3cccc-nested").unwrap();

        assert_eq!(store.get("T1aaaa-one").unwrap().title, "Edited");
    }

    #[test]
    fn test_load_discards_unsaved_changes() {
        let (_dir, mut store) = store_with(&["T1aaaa-one"]);
        store.set_title("T1aaaa-one", "Edited").unwrap();

        assert_eq!(store.load("T1aaaa-one").unwrap().title, "T1aaaa-one");
        assert!(!store.get("T1aaaa-one").unwrap().dirty);
    }

    #[test]
    fn test_get_or_create_and_save() {
        let (_dir, mut store) = create_test_store();

        let task = store.get_or_create("T1aaaa-new").unwrap();
        assert!(task.dirty);
        assert!(task.meta.date_created.is_some());
        store.set_role("T1aaaa-new", "developer").unwrap();
        store.set_title("T1aaaa-new", "New task").unwrap();

        assert!(store.save("T1aaaa-new").unwrap());
        assert!(!store.save("T1aaaa-new").unwrap());

        let raw = store.read_raw("T1aaaa-new").unwrap();
        assert!(raw.starts_with("---\n"));
        assert!(raw.contains("# New task"));
        assert!(store.tasks_root().join("T1aaaa-new/T1aaaa-new.md").is_file());
    }

    #[test]
    #[serial]
    fn test_create_task_generates_id() {
        enable_deterministic_ids();
        let (_dir, mut store) = create_test_store();

        let id = store.create_task("T", "Write the parser").unwrap();

        assert_eq!(id, "T000000-write-the-parser");
        assert_eq!(store.get(&id).unwrap().title, "Write the parser");
        disable_deterministic_ids();
    }

    #[test]
    fn test_save_dirty_and_save_all() {
        let (_dir, mut store) = store_with(&["T1aaaa-one", "T2bbbb-two"]);
        store.set_priority("T1aaaa-one", "HIGH").unwrap();

        assert_eq!(store.save_dirty().unwrap(), 1);
        assert_eq!(store.save_dirty().unwrap(), 0);
        assert_eq!(store.save_all().unwrap(), 2);

        store.load_all().unwrap();
        assert_eq!(store.get("T1aaaa-one").unwrap().meta.priority, "high");
    }

    #[test]
    fn test_date_edited_bumped_once_per_save() {
        let (_dir, mut store) = store_with(&["T1aaaa-one"]);
        store.set_role("T1aaaa-one", "tester").unwrap();
        let first = store.get("T1aaaa-one").unwrap().meta.date_edited;
        store.set_title("T1aaaa-one", "Again").unwrap();

        assert!(first.is_some());
        assert_eq!(store.get("T1aaaa-one").unwrap().meta.date_edited, first);
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b", "T3cccc-c"]);
        store.set_parent("T2bbbb-b", "T1aaaa-a").unwrap();
        store.set_parent("T3cccc-c", "T2bbbb-b").unwrap();
        let before = store.get_all().clone();

        let err = store.set_parent("T1aaaa-a", "T3cccc-c").unwrap_err();

        assert!(err.task_error::<CircularParent>().is_some());
        assert_eq!(store.get_all(), &before);
        let err = store.set_parent("T1aaaa-a", "T1aaaa-a").unwrap_err();
        assert_eq!(err.to_string(), "task T1aaaa-a cannot be its own parent");
    }

    #[test]
    fn test_set_parent_rejects_cycle_through_unloaded_ancestors() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\nparent: T2bbbb-b\n", "# A\n");
        write_task_file(&store, "T2bbbb-b", "role: developer\nparent: T3cccc-c\n", "# B\n");
        simple(&store, "T3cccc-c");

        let err = store.set_parent("T3cccc-c", "T1aaaa-a").unwrap_err();

        assert!(err.task_error::<CircularParent>().is_some());
        assert!(store.get("T3cccc-c").unwrap().meta.parent.is_empty());
        assert_eq!(store.save_dirty().unwrap(), 0);
    }

    #[test]
    fn test_set_parent_allows_dangling_ancestor() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\nparent: T9zzzz-gone\n", "# A\n");
        simple(&store, "T2bbbb-b");

        store.set_parent("T2bbbb-b", "T1aaaa-a").unwrap();

        assert_eq!(store.get("T2bbbb-b").unwrap().meta.parent, "T1aaaa-a");
    }

    #[test]
    fn test_set_parent_tolerates_existing_cycle_above() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\nparent: T2bbbb-b\n", "# A\n");
        write_task_file(&store, "T2bbbb-b", "role: developer\nparent: T1aaaa-a\n", "# B\n");
        simple(&store, "T3cccc-c");
        store.load_all().unwrap();

        store.set_parent("T3cccc-c", "T1aaaa-a").unwrap();

        assert_eq!(store.get("T3cccc-c").unwrap().meta.parent, "T1aaaa-a");
    }

    #[test]
    fn test_empty_parent_clears() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b"]);
        store.set_parent("T2bbbb-b", "T1aaaa-a").unwrap();
        assert_eq!(store.get_children("T1aaaa-a").len(), 1);

        store.set_parent("T2bbbb-b", "").unwrap();

        assert!(store.get("T2bbbb-b").unwrap().meta.parent.is_empty());
        assert!(store.get_children("T1aaaa-a").is_empty());
    }

    #[test]
    fn test_get_ancestors_nearest_first() {
        let (_dir, mut store) = store_with(&["E1aaaa-top", "E2bbbb-mid", "T3cccc-leaf"]);
        store.set_parent("E2bbbb-mid", "E1aaaa-top").unwrap();
        store.set_parent("T3cccc-leaf", "E2bbbb-mid").unwrap();

        assert_eq!(
            store.get_ancestors("T3cccc-leaf"),
            vec![
                ("E2bbbb".to_string(), "E2bbbb-mid".to_string()),
                ("E1aaaa".to_string(), "E1aaaa-top".to_string())
            ]
        );
        assert!(store.get_ancestors("E1aaaa-top").is_empty());
    }

    #[test]
    fn test_add_and_remove_blocker_both_sides() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b", "T3cccc-c"]);

        store.add_blocker("T1aaaa-a", "T3cccc-c").unwrap();
        store.add_blocker("T1aaaa-a", "T2bbbb-b").unwrap();
        store.add_blocker("T1aaaa-a", "T2bbbb-b").unwrap();
        store.add_blocked("T2bbbb-b", "T3cccc-c").unwrap();

        assert_eq!(store.get("T1aaaa-a").unwrap().meta.blockers, vec!["T2bbbb-b", "T3cccc-c"]);
        assert_eq!(store.get("T2bbbb-b").unwrap().meta.blocks, vec!["T1aaaa-a", "T3cccc-c"]);

        store.remove_blocker("T1aaaa-a", "T2bbbb-b").unwrap();
        store.remove_blocked("T2bbbb-b", "T3cccc-c").unwrap();

        assert_eq!(store.get("T1aaaa-a").unwrap().meta.blockers, vec!["T3cccc-c"]);
        assert!(store.get("T2bbbb-b").unwrap().meta.blocks.is_empty());
        assert!(store.get("T3cccc-c").unwrap().meta.blockers.is_empty());
    }

    #[test]
    fn test_add_blocker_errors() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        let err = store.add_blocker("T1aaaa-a", "T1aaaa-a").unwrap_err();
        assert_eq!(err.to_string(), "task T1aaaa-a cannot block itself");
        assert!(store.add_blocker("T1aaaa-a", "T9zzzz-gone").unwrap_err().task_error::<TaskNotFound>().is_some());
        assert!(store.get("T1aaaa-a").unwrap().meta.blockers.is_empty());
    }

    #[test]
    fn test_remove_blocker_tolerates_missing_blocker() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\nblockers:\n  - T9zzzz-gone\n", "# A\n");
        store.load_all().unwrap();

        store.remove_blocker("T1aaaa-a", "T9zzzz-gone").unwrap();

        assert!(store.get("T1aaaa-a").unwrap().meta.blockers.is_empty());
    }

    #[test]
    fn test_set_status_syncs_completed() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);

        store.set_status("T1aaaa-a", "Done").unwrap();
        assert!(store.get("T1aaaa-a").unwrap().meta.completed);
        assert_eq!(store.get("T1aaaa-a").unwrap().meta.status, "done");

        store.set_status("T1aaaa-a", "open").unwrap();
        assert!(!store.get("T1aaaa-a").unwrap().meta.completed);

        let err = store.set_status("T1aaaa-a", "finished").unwrap_err();
        assert!(err.to_string().contains("did you mean 'done'?"));
        assert_eq!(store.get("T1aaaa-a").unwrap().meta.status, STATUS_OPEN);
    }

    #[test]
    fn test_set_completed_leaves_blockers() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b"]);
        store.add_blocker("T2bbbb-b", "T1aaaa-a").unwrap();

        store.set_completed("T1aaaa-a", true).unwrap();

        assert_eq!(store.get("T1aaaa-a").unwrap().meta.status, STATUS_DONE);
        assert_eq!(store.get("T2bbbb-b").unwrap().meta.blockers, vec!["T1aaaa-a"]);
    }

    #[test]
    fn test_set_status_with_report_releases_blockers() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b"]);
        store.add_blocker("T2bbbb-b", "T1aaaa-a").unwrap();

        store.set_status_with_report("T1aaaa-a", STATUS_CANCELLED, "No longer needed").unwrap();

        let a = store.get("T1aaaa-a").unwrap();
        assert!(a.other.contains("## Completion Report\nNo longer needed"));
        assert!(a.meta.blocks.is_empty());
        assert!(store.get("T2bbbb-b").unwrap().meta.blockers.is_empty());
    }

    #[test]
    fn test_update_blockers_after_completion_requires_finished_task() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        let err = store.update_blockers_after_completion("T1aaaa-a").unwrap_err();
        assert!(err.task_error::<TaskStillActive>().is_some());
    }

    #[test]
    fn test_cancel_and_duplicate_reports() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b"]);

        store.cancel_task("T1aaaa-a", "out of scope").unwrap();
        store.mark_duplicate("T2bbbb-b", "T1aaaa-a").unwrap();

        let a = store.get("T1aaaa-a").unwrap();
        assert_eq!(a.meta.status, STATUS_CANCELLED);
        assert!(a.other.ends_with("Cancelled: out of scope"));
        let b = store.get("T2bbbb-b").unwrap();
        assert_eq!(b.meta.status, STATUS_DUPLICATE);
        assert!(b.other.ends_with("Marked as duplicate of T1aaaa-a"));
    }

    #[test]
    fn test_claim_and_in_progress() {
        let (_dir, mut store) = store_with(&["T1aaaa-a", "T2bbbb-b"]);
        store.claim_task("T1aaaa-a").unwrap();
        store.mark_in_progress("T2bbbb-b").unwrap();
        assert_eq!(store.get("T1aaaa-a").unwrap().meta.status, STATUS_IN_PROGRESS);
        assert_eq!(store.get("T2bbbb-b").unwrap().meta.status, STATUS_IN_PROGRESS);
        assert!(store.get("T1aaaa-a").unwrap().other.is_empty());
    }

    #[test]
    fn test_complete_task_twice_fails() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);

        store.complete_task("T1aaaa-a", "Shipped").unwrap();
        let before = store.get("T1aaaa-a").unwrap().clone();
        let err = store.complete_task("T1aaaa-a", "Again").unwrap_err();

        assert_eq!(err.task_error::<AlreadyCompleted>(), Some(&AlreadyCompleted("T1aaaa-a".to_string())));
        assert_eq!(store.get("T1aaaa-a").unwrap(), &before);
    }

    #[test]
    fn test_completion_report_survives_save() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\n", "# A\n\n## TODOs\n- [x] Only step\n");
        store.load_all().unwrap();

        store.complete_task("T1aaaa-a", "All good").unwrap();
        store.save_dirty().unwrap();
        let task = store.load("T1aaaa-a").unwrap();

        assert!(task.meta.completed);
        assert!(task.other.trim_end().ends_with("## Completion Report\nAll good"));
    }

    #[test]
    fn test_todo_lifecycle() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.add_todo("T1aaaa-a", "Write code").unwrap();
        store.add_todo("T1aaaa-a", "(role: tester) Test code").unwrap();

        let first = store.complete_todo("T1aaaa-a", 1, "wrote it").unwrap();
        assert_eq!(first, CompleteTodoResult { task_completed: false, remaining_incomplete: 1 });

        let again = store.complete_todo("T1aaaa-a", 1, "").unwrap();
        assert_eq!(again, CompleteTodoResult { task_completed: false, remaining_incomplete: 1 });

        let last = store.complete_todo("T1aaaa-a", 2, "").unwrap();
        assert!(last.task_completed);
        let task = store.get("T1aaaa-a").unwrap();
        assert!(task.meta.completed);
        assert_eq!(task.meta.status, STATUS_DONE);
        assert_eq!(task.todo_items[0].report.as_deref(), Some("wrote it"));
        assert_eq!(task.todo_items[1].role.as_deref(), Some("tester"));

        store.uncheck_todo("T1aaaa-a", 2).unwrap();
        let task = store.get("T1aaaa-a").unwrap();
        assert!(!task.meta.completed);
        assert_eq!(task.meta.status, STATUS_OPEN);
        assert_eq!(store.get_incomplete_todos("T1aaaa-a").unwrap().len(), 1);
    }

    #[test]
    fn test_add_todo_reopens_completed_task() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.set_completed("T1aaaa-a", true).unwrap();

        store.add_todo("T1aaaa-a", "One more thing").unwrap();

        assert!(!store.get("T1aaaa-a").unwrap().meta.completed);
        assert_eq!(store.get("T1aaaa-a").unwrap().meta.status, STATUS_OPEN);
    }

    #[test]
    fn test_remove_todo_can_complete_task() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.add_todo("T1aaaa-a", "Done already").unwrap();
        store.add_todo("T1aaaa-a", "Never mind").unwrap();
        store.complete_todo("T1aaaa-a", 1, "").unwrap();

        store.remove_todo("T1aaaa-a", 2).unwrap();

        let task = store.get("T1aaaa-a").unwrap();
        assert!(task.meta.completed);
        assert_eq!(task.meta.status, STATUS_DONE);
    }

    #[test]
    fn test_edit_and_reorder_todos() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        for text in ["one", "two", "three"] {
            store.add_todo("T1aaaa-a", text).unwrap();
        }
        store.complete_todo("T1aaaa-a", 2, "report").unwrap();

        store.edit_todo("T1aaaa-a", 2, "(role: reviewer) TWO").unwrap();
        store.reorder_todo("T1aaaa-a", 3, 1).unwrap();

        let items = &store.get("T1aaaa-a").unwrap().todo_items;
        let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
        assert_eq!(texts, vec!["three", "one", "TWO"]);
        assert_eq!(items.iter().map(|item| item.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(items[2].checked);
        assert_eq!(items[2].report.as_deref(), Some("report"));
        assert_eq!(items[2].role.as_deref(), Some("reviewer"));
    }

    #[test]
    fn test_todo_index_errors() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.add_todo("T1aaaa-a", "only").unwrap();

        for err in [
            store.complete_todo("T1aaaa-a", 0, "").unwrap_err(),
            store.complete_todo("T1aaaa-a", 2, "").unwrap_err(),
            store.remove_todo("T1aaaa-a", 5).unwrap_err(),
            store.reorder_todo("T1aaaa-a", 1, 2).unwrap_err(),
        ] {
            assert!(err.task_error::<TodoIndexOutOfRange>().is_some());
        }
        let err = store.uncheck_todo("T1aaaa-a", 3).unwrap_err();
        assert_eq!(err.to_string(), "invalid todo number 3, task has 1 todo items");
        assert!(store.add_todo("T1aaaa-a", "two\nlines").unwrap_err().task_error::<InvalidTodoText>().is_some());
        assert!(store
            .add_todo("T1aaaa-a", "(subtask: T2bbbb-b) child")
            .unwrap_err()
            .task_error::<InvalidTodoText>()
            .is_some());
    }

    #[test]
    fn test_set_priority_validates() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.set_priority("T1aaaa-a", "").unwrap();
        assert_eq!(store.get("T1aaaa-a").unwrap().meta.priority, "medium");

        let err = store.set_priority("T1aaaa-a", "urgent").unwrap_err();
        assert_eq!(err.task_error::<InvalidPriority>(), Some(&InvalidPriority("urgent".to_string())));
    }

    #[test]
    fn test_set_body_strips_sections() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.set_body("T1aaaa-a", "# Sneaky title\n\nReal text\n\n## TODOs\n- [ ] nope\n").unwrap();
        let task = store.get("T1aaaa-a").unwrap();
        assert_eq!(task.body, "Real text");
        assert_eq!(task.title, "T1aaaa-a");
        assert!(task.todo_items.is_empty());
    }

    #[test]
    fn test_subtask_mirror_and_reorder() {
        let (_dir, mut store) = store_with(&["E1aaaa-epic", "T2bbbb-b", "T3cccc-c"]);
        store.set_parent("T2bbbb-b", "E1aaaa-epic").unwrap();
        store.set_parent("T3cccc-c", "E1aaaa-epic").unwrap();
        store.set_completed("T3cccc-c", true).unwrap();

        assert!(store.update_parent_subtasks_for_child("T2bbbb-b").unwrap());
        assert!(!store.update_parent_subtasks("E1aaaa-epic").unwrap());
        assert!(!store.update_parent_subtasks_for_child("E1aaaa-epic").unwrap());

        let lines: Vec<String> =
            store.get("E1aaaa-epic").unwrap().subtask_items.iter().map(TodoItem::head_line).collect();
        assert_eq!(lines, vec!["- [ ] (subtask: T2bbbb-b) T2bbbb-b", "- [x] (subtask: T3cccc-c) T3cccc-c"]);

        store.reorder_subtask("E1aaaa-epic", 2, 1).unwrap();
        let first = &store.get("E1aaaa-epic").unwrap().subtask_items[0];
        assert_eq!(first.subtask_id.as_deref(), Some("T3cccc-c"));
        assert_eq!(first.index, 1);
        let err = store.reorder_subtask("E1aaaa-epic", 3, 1).unwrap_err();
        assert_eq!(err.to_string(), "invalid subtask number 3, task has 2 subtask items");
    }

    #[test]
    fn test_resolve_ids() {
        let (_dir, mut store) = store_with(&["T1a1a-foo", "T1a1a-bar", "T2bbbb-two"]);

        assert_eq!(store.resolve_id("T2bbbb").unwrap(), "T2bbbb-two");
        assert_eq!(store.resolve_ids(&["T2bbbb", "T1a1a-foo", "T2bbbb-two"]).unwrap(), vec!["T1a1a-foo", "T2bbbb-two"]);
        assert!(store.resolve_ids::<&str>(&[]).unwrap().is_empty());
        assert_eq!(store.get_resolved("T2bbbb").unwrap().id, "T2bbbb-two");

        let err = store.resolve_id("T1a1a").unwrap_err();
        assert_eq!(err.task_error::<AmbiguousReference>().unwrap().candidates, vec!["T1a1a-bar", "T1a1a-foo"]);
    }

    #[test]
    fn test_validation_uses_role_catalog() {
        let (_dir, mut store) = store_with(&["T1aaaa-a"]);
        store.set_role("T1aaaa-a", "designer").unwrap();

        let issues = store.validate();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "role file roles/designer.md does not exist");
        assert_eq!(store.validate_and_repair().len(), 1);
    }

    #[test]
    fn test_fix_missing_references_through_store() {
        let (_dir, mut store) = create_test_store();
        write_task_file(&store, "T1aaaa-a", "role: developer\nparent: E9zzzz-gone\n", "# A\n");
        store.load_all().unwrap();

        let notices = store.fix_missing_references();

        assert_eq!(notices.len(), 1);
        assert!(store.get("T1aaaa-a").unwrap().meta.parent.is_empty());
        assert_eq!(store.save_dirty().unwrap(), 1);
    }

    #[test]
    fn test_count_completions_since() {
        let (_dir, store) = create_test_store();
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(store.count_completions_since(None, since).unwrap(), 0);

        let mut log = MockCompletionLog::new();
        log.record("T1aaaa-a", since);
        let store = store.with_completion_log(Box::new(log));
        assert_eq!(store.count_completions_since(Some("T1aaaa-a"), since).unwrap(), 1);
    }

    #[test]
    fn test_count_completions_since_propagates_log_errors() {
        let (_dir, store) = create_test_store();
        let store = store.with_completion_log(Box::new(FailingCompletionLog::new("log unreadable")));

        let err = store.count_completions_since(None, Utc::now()).unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("log unreadable"));
    }

    #[test]
    fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig { load_concurrency: 0, ..StoreConfig::default() };
        fs::create_dir_all(dir.path().join("roles")).unwrap();
        fs::write(dir.path().join("roles/developer.md"), "# Developer\n").unwrap();
        let mut store = TaskStore::from_config(dir.path(), &config);
        simple(&store, "T1aaaa-a");

        assert_eq!(store.tasks_root(), dir.path().join("tasks").as_path());
        assert_eq!(store.load_all().unwrap(), 1);
        assert!(store.validate().is_empty());
        assert_eq!(store.count_completions_since(None, Utc::now()).unwrap(), 0);
    }
}
