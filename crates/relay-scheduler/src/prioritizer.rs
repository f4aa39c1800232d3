//! Task prioritization.

use std::cmp::Ordering;

use relay_state::{Requester, SchedulerSettings, Task};

use crate::error::SchedResult;

/// Orders one distro's runnable tasks into a ranked sequence.
///
/// The contract fixes determinism and totality: identical input must
/// produce identical output, with ties broken by task identity. The
/// weighting rule itself is policy.
pub trait TaskPrioritizer: Send + Sync {
    fn prioritize_tasks(
        &self,
        settings: &SchedulerSettings,
        tasks: Vec<Task>,
    ) -> SchedResult<Vec<Task>>;
}

/// Default policy: explicit priority first, patch submissions boosted over
/// mainline by `settings.patch_priority_boost`, then oldest first, then
/// task id as the deterministic tie-break.
#[derive(Debug, Default, Clone, Copy)]
pub struct CmpBasedPrioritizer;

impl CmpBasedPrioritizer {
    fn effective_priority(settings: &SchedulerSettings, task: &Task) -> i64 {
        let boost = match task.requester {
            Requester::Patch => settings.patch_priority_boost,
            Requester::Mainline => 0,
        };
        task.priority + boost
    }
}

impl TaskPrioritizer for CmpBasedPrioritizer {
    fn prioritize_tasks(
        &self,
        settings: &SchedulerSettings,
        mut tasks: Vec<Task>,
    ) -> SchedResult<Vec<Task>> {
        tasks.sort_by(|a, b| {
            let pa = Self::effective_priority(settings, a);
            let pb = Self::effective_priority(settings, b);
            match pb.cmp(&pa) {
                Ordering::Equal => match a.create_time.cmp(&b.create_time) {
                    Ordering::Equal => a.id.cmp(&b.id),
                    other => other,
                },
                other => other,
            }
        });
        Ok(tasks)
    }
}
