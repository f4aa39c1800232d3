//! Runnable-task discovery.

use std::collections::HashMap;

use tracing::debug;

use relay_state::{StateStore, Task, TaskStatus};

use crate::error::SchedResult;

/// Finds every task eligible to run now, across all distros.
///
/// Failure here is fatal to the whole pass: without a task set, no later
/// stage can proceed safely.
pub trait TaskFinder: Send + Sync {
    fn find_runnable_tasks(&self, store: &StateStore) -> SchedResult<Vec<Task>>;
}

/// Store-backed finder: a task is runnable when it is unscheduled and all
/// of its dependencies are finished.
#[derive(Debug, Default, Clone, Copy)]
pub struct DbTaskFinder;

impl TaskFinder for DbTaskFinder {
    fn find_runnable_tasks(&self, store: &StateStore) -> SchedResult<Vec<Task>> {
        let tasks = store.list_tasks()?;

        let statuses: HashMap<&str, TaskStatus> =
            tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();

        let runnable: Vec<Task> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Unscheduled)
            .filter(|t| {
                t.depends_on.iter().all(|dep| {
                    // An unknown dependency blocks the task until it appears.
                    statuses.get(dep.as_str()) == Some(&TaskStatus::Finished)
                })
            })
            .cloned()
            .collect();

        debug!(
            total = tasks.len(),
            runnable = runnable.len(),
            "runnable tasks found"
        );
        Ok(runnable)
    }
}
