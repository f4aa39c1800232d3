//! Task queue persistence.

use std::collections::HashMap;

use tracing::debug;

use relay_state::{StateStore, Task, TaskId, TaskQueue, TaskQueueItem};

use crate::error::{SchedError, SchedResult};

/// Atomically replaces a distro's stored queue with this pass's ranking.
///
/// On failure the stored queue is left as it was (no partial write) and
/// the distro is skipped for host allocation this pass: a wrong or empty
/// queue must never trigger scale-up.
pub trait TaskQueuePersister: Send + Sync {
    fn persist_task_queue(
        &self,
        store: &StateStore,
        distro_id: &str,
        ordered_tasks: &[Task],
        durations: &HashMap<TaskId, f64>,
        generated_at: u64,
    ) -> SchedResult<TaskQueue>;
}

/// Store-backed persister: whole-document replace stamped with the pass
/// time, then per-task compare-and-swap into the queued state.
#[derive(Debug, Default, Clone, Copy)]
pub struct DbQueuePersister;

impl TaskQueuePersister for DbQueuePersister {
    fn persist_task_queue(
        &self,
        store: &StateStore,
        distro_id: &str,
        ordered_tasks: &[Task],
        durations: &HashMap<TaskId, f64>,
        generated_at: u64,
    ) -> SchedResult<TaskQueue> {
        let mut items = Vec::with_capacity(ordered_tasks.len());
        for (rank, task) in ordered_tasks.iter().enumerate() {
            let expected = durations
                .get(&task.id)
                .copied()
                .ok_or_else(|| SchedError::MissingDuration(task.id.clone()))?;
            items.push(TaskQueueItem {
                task_id: task.id.clone(),
                expected_duration_secs: expected,
                rank: rank as u32,
            });
        }

        let queue = TaskQueue {
            distro_id: distro_id.to_string(),
            generated_at,
            items,
        };
        store.replace_task_queue(&queue)?;

        // Flip each task to queued. A task already claimed by a concurrent
        // pass is left alone; the desired end state is already reached.
        for item in &queue.items {
            let claimed =
                store.mark_task_queued(&item.task_id, distro_id, item.expected_duration_secs)?;
            if !claimed {
                debug!(task_id = %item.task_id, "task already queued by another pass");
            }
        }

        Ok(queue)
    }
}
