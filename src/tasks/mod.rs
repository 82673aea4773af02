//! File-backed task tracking.
//!
//! Each task is a markdown file with YAML front matter, stored at
//! `<root>/<id>/<id>.md`. This module provides:
//! - A lossless document parser and renderer
//! - A parallel tree loader and ID resolution by full ID, short ID, or path
//! - A store whose mutators keep parent links acyclic and blocker edges symmetric
//! - Validation and repair of a loaded tree
//! - Root and free task list generation, full or incremental
//!
//! # Example
//!
//! ```no_run
//! use strandyard::tasks::{generate_master_lists, TaskStore};
//! use strandyard::roles::DirRoleCatalog;
//! use std::path::Path;
//!
//! let mut store = TaskStore::new("tasks", Box::new(DirRoleCatalog::new("roles")));
//! store.load_all().unwrap();
//!
//! // Block one task on another and finish the blocker
//! store.add_blocker("T2bbbb-tests", "T1aaaa-parser").unwrap();
//! store.set_status_with_report("T1aaaa-parser", "done", "Parser merged").unwrap();
//! store.save_dirty().unwrap();
//!
//! // Rewrite the task lists
//! generate_master_lists(
//!     store.get_all(),
//!     Path::new("tasks/root-tasks.md"),
//!     Path::new("tasks/free-tasks.md"),
//! )
//! .unwrap();
//! ```

pub mod blockers;
pub mod free_list;
pub mod id;
pub mod loader;
pub mod master_list;
pub mod models;
pub mod parser;
pub mod resolve;
pub mod store;
pub mod subtasks;
pub mod validate;

pub use blockers::TaskStillActive;
pub use free_list::{parse_free_list, FreeListParse};
pub use loader::{load_tasks, load_tasks_with_concurrency, TaskMap};
pub use master_list::{
    calculate_incremental_free_list_update, generate_master_lists, update_free_list_incrementally,
    IncrementalFreeListUpdate,
};
pub use models::{InvalidPriority, InvalidStatus, Metadata, Priority, Status, Task, TodoItem};
pub use resolve::{resolve_task_id, AmbiguousReference, TaskNotFound};
pub use store::{
    AlreadyCompleted, CircularParent, CompleteTodoResult, InvalidTodoText, SelfReference, TaskStore,
    TodoIndexOutOfRange,
};
pub use validate::ValidationIssue;
