//! Expected-duration estimation from historical completion data.

use std::collections::HashMap;

use tracing::debug;

use relay_state::{SchedulerSettings, StateStore, Task, TaskId};

use crate::error::SchedResult;

/// Estimates how long each runnable task will take.
///
/// Durations are advisory input to capacity math, not ordering; failure
/// aborts processing for the affected distro only.
pub trait TaskDurationEstimator: Send + Sync {
    fn expected_durations(
        &self,
        store: &StateStore,
        settings: &SchedulerSettings,
        tasks: &[Task],
    ) -> SchedResult<HashMap<TaskId, f64>>;
}

/// Default estimator: mean of observed runtimes of finished tasks sharing
/// the same project and display name. Tasks with no history receive
/// `settings.default_task_duration_secs` rather than an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PastRunsEstimator;

impl TaskDurationEstimator for PastRunsEstimator {
    fn expected_durations(
        &self,
        store: &StateStore,
        settings: &SchedulerSettings,
        tasks: &[Task],
    ) -> SchedResult<HashMap<TaskId, f64>> {
        // History is keyed by (project, display name); compute each key once
        // even when many tasks share it.
        let mut history: HashMap<(String, String), f64> = HashMap::new();
        let mut durations = HashMap::new();

        for task in tasks {
            let key = (task.project.clone(), task.display_name.clone());
            let expected = match history.get(&key) {
                Some(mean) => *mean,
                None => {
                    let observed = store.finished_durations(&task.project, &task.display_name)?;
                    let mean = if observed.is_empty() {
                        settings.default_task_duration_secs
                    } else {
                        observed.iter().sum::<f64>() / observed.len() as f64
                    };
                    history.insert(key, mean);
                    mean
                }
            };
            durations.insert(task.id.clone(), expected);
        }

        debug!(tasks = tasks.len(), "expected durations computed");
        Ok(durations)
    }
}
