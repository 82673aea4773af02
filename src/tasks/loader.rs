//! Parallel loading of a task tree.
//!
//! Every directory below the tasks root may hold one task file, named
//! `<dirname>.md` or, failing that, `task.md`. The directory name is the
//! task ID. Files are parsed by a fixed number of worker threads and the
//! results are sent to a single collector that owns the map.
//!
//! The first error seen (from the walk or any parse) is the one returned.
//! Parses already running when it arrives are allowed to finish and their
//! results are dropped; files still queued are skipped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;

use crate::error::{Error, Result};
use crate::tasks::models::Task;
use crate::tasks::parser::parse_file;

/// Number of concurrent parses used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Tasks keyed by ID. Ordered so that every pass over it is deterministic.
pub type TaskMap = BTreeMap<String, Task>;

/// The task file inside `dir`, if it has one.
pub(crate) fn task_file_in(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_string_lossy();
    [dir.join(format!("{name}.md")), dir.join("task.md")]
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Visit every directory below `root`, parents before children, siblings in
/// name order. Stops early when `visit` returns false.
fn walk_dirs(root: &Path, mut visit: impl FnMut(&Path) -> bool) -> Result<()> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut children = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                children.push(entry.path());
            }
        }
        children.sort();
        for child in children.iter().rev() {
            pending.push(child.clone());
        }
        if dir != root && !visit(&dir) {
            break;
        }
    }
    Ok(())
}

/// Load every task below `root` with the default concurrency.
///
/// # Errors
///
/// Returns the first walk or parse error, or [`Error::DuplicateTaskId`] if
/// two directories share a name.
pub fn load_tasks(root: &Path) -> Result<TaskMap> {
    load_tasks_with_concurrency(root, DEFAULT_CONCURRENCY)
}

/// Load every task below `root` using at most `concurrency` parser threads.
///
/// # Errors
///
/// Same as [`load_tasks`].
pub fn load_tasks_with_concurrency(root: &Path, concurrency: usize) -> Result<TaskMap> {
    let workers = concurrency.max(1);
    let failed = AtomicBool::new(false);
    let (job_tx, job_rx) = mpsc::sync_channel::<PathBuf>(workers);
    let job_rx = Mutex::new(job_rx);
    let (result_tx, result_rx) = mpsc::channel::<Result<Task>>();

    thread::scope(|scope| {
        let walker_tx = result_tx.clone();
        let failed_ref = &failed;
        scope.spawn(move || {
            let walked = walk_dirs(root, |dir| {
                if failed_ref.load(Ordering::SeqCst) {
                    return false;
                }
                match task_file_in(dir) {
                    Some(path) => job_tx.send(path).is_ok(),
                    None => true,
                }
            });
            if let Err(err) = walked {
                let _ = walker_tx.send(Err(err));
            }
        });

        for _ in 0..workers {
            let worker_tx = result_tx.clone();
            let job_rx = &job_rx;
            scope.spawn(move || loop {
                let job = match job_rx.lock() {
                    Ok(rx) => rx.recv(),
                    Err(_) => break,
                };
                let Ok(path) = job else { break };
                if failed_ref.load(Ordering::SeqCst) {
                    continue;
                }
                let result = parse_file(&path)
                    .map_err(|source| Error::TaskFile { path: path.clone(), source: Box::new(source) });
                if worker_tx.send(result).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);

        let mut tasks = TaskMap::new();
        let mut first_error: Option<Error> = None;
        for result in result_rx {
            if first_error.is_some() {
                continue;
            }
            let error = match result {
                Ok(task) => match tasks.get(&task.id) {
                    Some(existing) => Error::DuplicateTaskId {
                        id: task.id.clone(),
                        first: existing.file_path.clone(),
                        second: task.file_path,
                    },
                    None => {
                        tasks.insert(task.id.clone(), task);
                        continue;
                    }
                },
                Err(err) => err,
            };
            tracing::warn!(root = %root.display(), error = %error, "task tree load failed");
            failed.store(true, Ordering::SeqCst);
            first_error = Some(error);
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!(root = %root.display(), count = tasks.len(), "loaded task tree");
                Ok(tasks)
            }
        }
    })
}
