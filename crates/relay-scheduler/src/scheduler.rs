//! Scheduler — runs one scheduling pass end to end.
//!
//! The scheduler composes the pluggable pipeline stages over a shared
//! state store. Per-distro failures are recorded in the pass outcome and
//! do not abort sibling distros; only a finder failure (no data) or an
//! allocator failure (no safe capacity bounds) stops more than one distro.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use relay_allocate::{
    AllocateError, AllocatorData, DistroCapacity, DurationBasedAllocator, HostAllocator,
};
use relay_cloud::{CloudError, CloudRegistry};
use relay_state::{Host, SchedulerSettings, StateError, StateStore, Task, TaskQueue};

use crate::error::SchedError;
use crate::estimator::{PastRunsEstimator, TaskDurationEstimator};
use crate::finder::{DbTaskFinder, TaskFinder};
use crate::persister::{DbQueuePersister, TaskQueuePersister};
use crate::prioritizer::{CmpBasedPrioritizer, TaskPrioritizer};
use crate::variant_cache::VariantCache;

/// Which per-distro pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Prioritize,
    Estimate,
    Persist,
    /// Reading distro, queue, or host state around the pipeline proper.
    Snapshot,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Prioritize => "prioritize",
            PipelineStage::Estimate => "estimate",
            PipelineStage::Persist => "persist",
            PipelineStage::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// An error recorded during a pass, with enough context to tell a healthy
/// pass from a degraded one.
#[derive(Debug, Error)]
pub enum PassError {
    /// The finder failed; the whole pass was abandoned.
    #[error("task finder failed: {0}")]
    Finder(SchedError),

    /// A version's configuration could not be resolved; its tasks were
    /// skipped this pass.
    #[error("version {version_id}: {source}")]
    Config {
        version_id: String,
        source: SchedError,
    },

    /// A distro's pipeline failed; the distro was skipped this pass.
    #[error("distro {distro_id} failed during {stage}: {source}")]
    Pipeline {
        distro_id: String,
        stage: PipelineStage,
        source: SchedError,
    },

    /// A distro referenced by tasks or queues has no stored record.
    #[error("distro {0} not found in store")]
    UnknownDistro(String),

    /// Capacity math failed; no hosts were spawned this pass.
    #[error("host allocation failed: {0}")]
    Allocator(AllocateError),

    /// A single instance-create call failed; siblings proceeded.
    #[error("spawning for distro {distro_id}: {source}")]
    Spawn {
        distro_id: String,
        source: CloudError,
    },

    /// A spawned host could not be recorded in the store.
    #[error("recording host for distro {distro_id}: {source}")]
    HostRecord {
        distro_id: String,
        source: StateError,
    },
}

/// Aggregate result of one scheduling pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Newly spawned hosts, bucketed by distro id. Distros the allocator
    /// considered but found no need for appear with an empty bucket.
    pub hosts_spawned: HashMap<String, Vec<Host>>,
    /// Everything that went wrong, in the order it was encountered.
    pub errors: Vec<PassError>,
}

impl PassOutcome {
    /// True when nothing was skipped or degraded.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total hosts created across all distros.
    pub fn total_spawned(&self) -> usize {
        self.hosts_spawned.values().map(Vec::len).sum()
    }
}

/// The scheduling orchestrator.
///
/// Strategies are trait objects so policies can be swapped by
/// configuration; the defaults mirror production behavior.
pub struct Scheduler {
    store: StateStore,
    settings: SchedulerSettings,
    clouds: CloudRegistry,
    finder: Box<dyn TaskFinder>,
    prioritizer: Box<dyn TaskPrioritizer>,
    estimator: Box<dyn TaskDurationEstimator>,
    persister: Box<dyn TaskQueuePersister>,
    allocator: Box<dyn HostAllocator>,
}

impl Scheduler {
    /// Create a scheduler with the default strategy set.
    pub fn new(store: StateStore, settings: SchedulerSettings, clouds: CloudRegistry) -> Self {
        Self {
            store,
            settings,
            clouds,
            finder: Box::new(DbTaskFinder),
            prioritizer: Box::new(CmpBasedPrioritizer),
            estimator: Box::new(PastRunsEstimator),
            persister: Box::new(DbQueuePersister),
            allocator: Box::new(DurationBasedAllocator),
        }
    }

    /// Replace the finder strategy.
    pub fn with_finder(mut self, finder: Box<dyn TaskFinder>) -> Self {
        self.finder = finder;
        self
    }

    /// Replace the prioritizer strategy.
    pub fn with_prioritizer(mut self, prioritizer: Box<dyn TaskPrioritizer>) -> Self {
        self.prioritizer = prioritizer;
        self
    }

    /// Replace the duration estimator strategy.
    pub fn with_estimator(mut self, estimator: Box<dyn TaskDurationEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Replace the queue persister strategy.
    pub fn with_persister(mut self, persister: Box<dyn TaskQueuePersister>) -> Self {
        self.persister = persister;
        self
    }

    /// Replace the allocator strategy.
    pub fn with_allocator(mut self, allocator: Box<dyn HostAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Run one scheduling pass.
    pub async fn run_pass(&self) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        let generated_at = epoch_millis();

        // 1. Discover runnable work. Nothing else is safe without it.
        let runnable = match self.finder.find_runnable_tasks(&self.store) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "task finder failed, abandoning pass");
                outcome.errors.push(PassError::Finder(e));
                return outcome;
            }
        };

        // 2. Resolve build variants through the pass-local cache and
        // partition tasks by distro. Unresolvable versions only take
        // their own tasks out of the pass.
        let mut cache = VariantCache::new();
        let by_distro = self.partition_by_distro(runnable, &mut cache, &mut outcome.errors);

        // 3. Per-distro pipeline: prioritize, estimate, persist. A failed
        // distro is skipped for allocation and retried next pass.
        let mut failed_distros: HashSet<String> = HashSet::new();
        let mut persisted = 0usize;
        for (distro_id, tasks) in by_distro {
            // A queue for a distro the store does not know would strand its
            // tasks in the queued state: the allocator only sizes stored
            // distros, so no host would ever pick them up. Leave the tasks
            // unscheduled and report the bad reference instead.
            match self.store.get_distro(&distro_id) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(%distro_id, tasks = tasks.len(), "tasks reference unknown distro");
                    outcome.errors.push(PassError::UnknownDistro(distro_id));
                    continue;
                }
                Err(e) => {
                    failed_distros.insert(distro_id.clone());
                    outcome.errors.push(PassError::Pipeline {
                        distro_id,
                        stage: PipelineStage::Snapshot,
                        source: SchedError::State(e),
                    });
                    continue;
                }
            }
            match self.schedule_distro(&distro_id, tasks, generated_at) {
                Ok(queue) => {
                    debug!(%distro_id, items = queue.items.len(), "queue persisted");
                    persisted += 1;
                }
                Err((stage, source)) => {
                    warn!(%distro_id, %stage, error = %source, "distro pipeline failed");
                    failed_distros.insert(distro_id.clone());
                    outcome.errors.push(PassError::Pipeline {
                        distro_id,
                        stage,
                        source,
                    });
                }
            }
        }

        // 4. Global capacity math over every distro's stored queue,
        // excluding distros that failed this pass.
        let data = self.allocator_data(&failed_distros, &mut outcome.errors);
        let needed = match self.allocator.hosts_needed(&data, &self.settings) {
            Ok(needed) => needed,
            Err(e) => {
                warn!(error = %e, "allocator failed, skipping host spawning");
                outcome.errors.push(PassError::Allocator(e));
                return outcome;
            }
        };

        // 5. Spawn.
        let (spawned, spawn_errors) = self.spawn_hosts(&needed).await;
        outcome.hosts_spawned = spawned;
        outcome.errors.extend(spawn_errors);

        info!(
            distros_persisted = persisted,
            hosts_spawned = outcome.total_spawned(),
            errors = outcome.errors.len(),
            "scheduling pass complete"
        );
        outcome
    }

    /// Issue exactly `needed[distro]` instance-create calls per distro.
    ///
    /// All capacity policy lives in the allocator; this method performs no
    /// additional clamping. Per-instance failures are collected, never
    /// fatal: a failed create cancels neither the remaining requests for
    /// that distro nor any other distro. Distros with zero need make zero
    /// provider calls and appear with an empty bucket.
    pub async fn spawn_hosts(
        &self,
        needed: &HashMap<String, u32>,
    ) -> (HashMap<String, Vec<Host>>, Vec<PassError>) {
        let mut buckets: HashMap<String, Vec<Host>> = HashMap::new();
        let mut errors = Vec::new();

        // Deterministic order across distros.
        let ordered: BTreeMap<&String, &u32> = needed.iter().collect();
        for (distro_id, &count) in ordered {
            buckets.insert(distro_id.clone(), Vec::new());
            if count == 0 {
                continue;
            }

            let distro = match self.store.get_distro(distro_id) {
                Ok(Some(distro)) => distro,
                Ok(None) => {
                    errors.push(PassError::UnknownDistro(distro_id.clone()));
                    continue;
                }
                Err(e) => {
                    errors.push(PassError::Pipeline {
                        distro_id: distro_id.clone(),
                        stage: PipelineStage::Snapshot,
                        source: SchedError::State(e),
                    });
                    continue;
                }
            };

            let manager = match self.clouds.manager_for(&distro) {
                Ok(manager) => manager,
                Err(e) => {
                    errors.push(PassError::Spawn {
                        distro_id: distro_id.clone(),
                        source: e,
                    });
                    continue;
                }
            };

            for _ in 0..count {
                match manager
                    .spawn_instance(distro_id, &self.settings.config_dir)
                    .await
                {
                    Ok(host) => {
                        if let Err(e) = self.store.put_host(&host) {
                            errors.push(PassError::HostRecord {
                                distro_id: distro_id.clone(),
                                source: e,
                            });
                        }
                        buckets.entry(distro_id.clone()).or_default().push(host);
                    }
                    Err(e) => {
                        warn!(%distro_id, error = %e, "instance create failed");
                        errors.push(PassError::Spawn {
                            distro_id: distro_id.clone(),
                            source: e,
                        });
                    }
                }
            }

            let created = buckets[distro_id].len();
            debug!(%distro_id, requested = count, created, "spawn requests issued");
        }

        (buckets, errors)
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Resolve each task's distro and group tasks per distro.
    ///
    /// Tasks keep a prior distro assignment if they have one; otherwise
    /// they take the first `run_on` entry of their build variant.
    fn partition_by_distro(
        &self,
        runnable: Vec<Task>,
        cache: &mut VariantCache,
        errors: &mut Vec<PassError>,
    ) -> BTreeMap<String, Vec<Task>> {
        let mut by_distro: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        let mut reported_versions: HashSet<String> = HashSet::new();

        for task in runnable {
            let distro_id = if !task.distro_id.is_empty() {
                task.distro_id.clone()
            } else {
                match cache.resolve(&self.store, &task.version_id, &task.build_variant) {
                    Ok(variant) => match variant.run_on.first() {
                        Some(distro_id) => distro_id.clone(),
                        None => {
                            if reported_versions.insert(task.version_id.clone()) {
                                errors.push(PassError::Config {
                                    version_id: task.version_id.clone(),
                                    source: SchedError::NoRunOnDistro {
                                        version_id: task.version_id.clone(),
                                        variant: task.build_variant.clone(),
                                    },
                                });
                            }
                            continue;
                        }
                    },
                    Err(e) => {
                        // Report each broken version once, not per task.
                        if reported_versions.insert(task.version_id.clone()) {
                            errors.push(PassError::Config {
                                version_id: task.version_id.clone(),
                                source: e,
                            });
                        }
                        continue;
                    }
                }
            };
            by_distro.entry(distro_id).or_default().push(task);
        }
        by_distro
    }

    /// Run one distro's pipeline, tagging failures with their stage.
    fn schedule_distro(
        &self,
        distro_id: &str,
        tasks: Vec<Task>,
        generated_at: u64,
    ) -> Result<TaskQueue, (PipelineStage, SchedError)> {
        let ordered = self
            .prioritizer
            .prioritize_tasks(&self.settings, tasks)
            .map_err(|e| (PipelineStage::Prioritize, e))?;

        let durations = self
            .estimator
            .expected_durations(&self.store, &self.settings, &ordered)
            .map_err(|e| (PipelineStage::Estimate, e))?;

        self.persister
            .persist_task_queue(&self.store, distro_id, &ordered, &durations, generated_at)
            .map_err(|e| (PipelineStage::Persist, e))
    }

    /// Snapshot every distro's stored queue and host count for the
    /// allocator, skipping distros that failed this pass.
    fn allocator_data(
        &self,
        failed_distros: &HashSet<String>,
        errors: &mut Vec<PassError>,
    ) -> AllocatorData {
        let mut data = AllocatorData::default();
        let distros = match self.store.list_distros() {
            Ok(distros) => distros,
            Err(e) => {
                errors.push(PassError::Allocator(AllocateError::InvalidInput(format!(
                    "could not list distros: {e}"
                ))));
                return data;
            }
        };

        for distro in distros {
            if failed_distros.contains(&distro.id) {
                continue;
            }
            let (queue_length, queued_duration_secs) = match self.store.get_task_queue(&distro.id)
            {
                Ok(Some(queue)) => (
                    queue.items.len() as u32,
                    queue.total_expected_duration_secs(),
                ),
                Ok(None) => (0, 0.0),
                Err(e) => {
                    errors.push(PassError::Pipeline {
                        distro_id: distro.id.clone(),
                        stage: PipelineStage::Snapshot,
                        source: SchedError::State(e),
                    });
                    continue;
                }
            };
            let running_hosts = match self.store.active_host_count(&distro.id) {
                Ok(count) => count,
                Err(e) => {
                    errors.push(PassError::Pipeline {
                        distro_id: distro.id.clone(),
                        stage: PipelineStage::Snapshot,
                        source: SchedError::State(e),
                    });
                    continue;
                }
            };
            data.distros.push(DistroCapacity {
                distro_id: distro.id,
                pool_size: distro.pool_size,
                running_hosts,
                queue_length,
                queued_duration_secs,
            });
        }
        data
    }
}

/// Current Unix epoch in milliseconds, used as the pass stamp.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    use relay_cloud::MockCloud;
    use relay_state::{Distro, Requester, TaskStatus, Version};

    const PROJECT_CONFIG: &str = r#"
[[buildvariants]]
name = "ubuntu"
display_name = "ubuntu1404"
run_on = ["ubuntu1404-test"]
tasks = ["agent", "plugin", "model"]

[buildvariants.expansions]
mongo_url = "http://fastdl.mongodb.org/linux/mongodb-linux-x86_64-2.6.1.tgz"
"#;

    fn test_distro(id: &str, pool_size: u32) -> Distro {
        Distro {
            id: id.to_string(),
            provider: "mock".to_string(),
            pool_size,
            provider_settings: Map::new(),
        }
    }

    fn test_task(id: &str, version_id: &str, variant: &str) -> Task {
        Task {
            id: id.to_string(),
            version_id: version_id.to_string(),
            project: "mci".to_string(),
            display_name: id.to_string(),
            build_variant: variant.to_string(),
            distro_id: String::new(),
            requester: Requester::Mainline,
            depends_on: Vec::new(),
            priority: 0,
            expected_duration_secs: None,
            status: TaskStatus::Unscheduled,
            create_time: 1000,
            start_time: 0,
            finish_time: 0,
        }
    }

    /// Store, scheduler, and a handle on the mock provider.
    fn test_scheduler() -> (StateStore, Scheduler, Arc<MockCloud>) {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(MockCloud::new());
        let mut clouds = CloudRegistry::new();
        clouds.register("mock", cloud.clone());
        let scheduler = Scheduler::new(store.clone(), SchedulerSettings::default(), clouds);
        (store, scheduler, cloud)
    }

    fn seed_ubuntu_version(store: &StateStore) {
        store
            .put_version(&Version {
                id: "v1".to_string(),
                project: "mci".to_string(),
                config: PROJECT_CONFIG.to_string(),
                create_time: 1000,
            })
            .unwrap();
        for name in ["agent", "plugin", "model"] {
            store.put_task(&test_task(name, "v1", "ubuntu")).unwrap();
        }
    }

    // ── spawn_hosts ────────────────────────────────────────────────

    #[tokio::test]
    async fn zero_need_makes_zero_provider_calls() {
        let (store, scheduler, cloud) = test_scheduler();
        for id in ["d1", "d2", "d3"] {
            store.put_distro(&test_distro(id, 1)).unwrap();
        }
        let needed = Map::from([
            ("d1".to_string(), 0),
            ("d2".to_string(), 0),
            ("d3".to_string(), 0),
        ]);

        let (buckets, errors) = scheduler.spawn_hosts(&needed).await;

        assert!(errors.is_empty());
        assert_eq!(cloud.total_spawn_calls(), 0);
        assert_eq!(buckets["d1"].len(), 0);
        assert_eq!(buckets["d2"].len(), 0);
        assert_eq!(buckets["d3"].len(), 0);
    }

    #[tokio::test]
    async fn spawns_exactly_needed_bucketed_by_distro() {
        let (store, scheduler, cloud) = test_scheduler();
        for id in ["d1", "d2", "d3"] {
            store.put_distro(&test_distro(id, 10)).unwrap();
        }
        let needed = Map::from([
            ("d1".to_string(), 3),
            ("d2".to_string(), 0),
            ("d3".to_string(), 1),
        ]);

        let (buckets, errors) = scheduler.spawn_hosts(&needed).await;

        assert!(errors.is_empty());
        assert_eq!(buckets["d1"].len(), 3);
        assert!(buckets["d1"].iter().all(|h| h.distro_id == "d1"));
        assert_eq!(buckets["d2"].len(), 0);
        assert_eq!(buckets["d3"].len(), 1);
        assert_eq!(buckets["d3"][0].distro_id, "d3");
        assert_eq!(cloud.total_spawn_calls(), 4);

        // Created hosts are persisted immediately, before they run.
        assert_eq!(store.active_host_count("d1").unwrap(), 3);
        assert_eq!(store.active_host_count("d3").unwrap(), 1);
    }

    #[tokio::test]
    async fn instance_failure_does_not_cancel_siblings() {
        let (store, scheduler, cloud) = test_scheduler();
        store.put_distro(&test_distro("d1", 10)).unwrap();
        store.put_distro(&test_distro("d2", 10)).unwrap();
        cloud.fail_next_spawns("d1", 1);

        let needed = Map::from([("d1".to_string(), 3), ("d2".to_string(), 2)]);
        let (buckets, errors) = scheduler.spawn_hosts(&needed).await;

        // One failure recorded; the other two d1 requests and all of d2
        // still went through.
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], PassError::Spawn { distro_id, .. } if distro_id == "d1"));
        assert_eq!(buckets["d1"].len(), 2);
        assert_eq!(buckets["d2"].len(), 2);
        assert_eq!(cloud.spawn_calls("d1"), 3);
        assert_eq!(cloud.spawn_calls("d2"), 2);
    }

    #[tokio::test]
    async fn unknown_distro_is_reported_not_fatal() {
        let (store, scheduler, cloud) = test_scheduler();
        store.put_distro(&test_distro("d1", 10)).unwrap();

        let needed = Map::from([("d1".to_string(), 1), ("ghost".to_string(), 2)]);
        let (buckets, errors) = scheduler.spawn_hosts(&needed).await;

        assert_eq!(buckets["d1"].len(), 1);
        assert_eq!(buckets["ghost"].len(), 0);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], PassError::UnknownDistro(d) if d == "ghost"));
        assert_eq!(cloud.total_spawn_calls(), 1);
    }

    // ── run_pass ───────────────────────────────────────────────────

    #[tokio::test]
    async fn full_pass_schedules_and_spawns() {
        let (store, scheduler, cloud) = test_scheduler();
        seed_ubuntu_version(&store);
        store.put_distro(&test_distro("ubuntu1404-test", 10)).unwrap();

        let outcome = scheduler.run_pass().await;
        assert!(outcome.is_healthy(), "errors: {:?}", outcome.errors);

        // Queue of exactly the variant's 3 tasks, ranked deterministically
        // (equal priority and age, so ordered by task id).
        let queue = store.get_task_queue("ubuntu1404-test").unwrap().unwrap();
        assert_eq!(queue.items.len(), 3);
        let ids: Vec<&str> = queue.items.iter().map(|i| i.task_id.as_str()).collect();
        assert_eq!(ids, vec!["agent", "model", "plugin"]);
        assert_eq!(queue.items[0].rank, 0);
        assert_eq!(queue.items[2].rank, 2);

        // Tasks moved to queued with their distro assignment.
        let agent = store.get_task("agent").unwrap().unwrap();
        assert_eq!(agent.status, TaskStatus::Queued);
        assert_eq!(agent.distro_id, "ubuntu1404-test");

        // With zero existing hosts and ample pool, the spawner created
        // exactly what the allocator asked for, tagged to the distro.
        let spawned = &outcome.hosts_spawned["ubuntu1404-test"];
        assert!(!spawned.is_empty());
        assert!(spawned.iter().all(|h| h.distro_id == "ubuntu1404-test"));
        assert_eq!(
            cloud.spawn_calls("ubuntu1404-test") as usize,
            spawned.len()
        );
        assert_eq!(
            store.active_host_count("ubuntu1404-test").unwrap() as usize,
            spawned.len()
        );
    }

    #[tokio::test]
    async fn repeated_passes_do_not_double_spawn() {
        let (store, scheduler, _cloud) = test_scheduler();
        seed_ubuntu_version(&store);
        store.put_distro(&test_distro("ubuntu1404-test", 10)).unwrap();

        let first = scheduler.run_pass().await;
        let spawned = first.total_spawned();
        assert!(spawned > 0);

        // Queue depth is unchanged, but the hosts now exist; the
        // allocator's need is already covered.
        let second = scheduler.run_pass().await;
        assert!(second.is_healthy(), "errors: {:?}", second.errors);
        assert_eq!(second.total_spawned(), 0);
        assert_eq!(
            store.active_host_count("ubuntu1404-test").unwrap() as usize,
            spawned
        );
    }

    #[tokio::test]
    async fn broken_version_isolated_from_healthy_distro() {
        let (store, scheduler, _cloud) = test_scheduler();
        seed_ubuntu_version(&store);
        store.put_distro(&test_distro("ubuntu1404-test", 10)).unwrap();

        // A task of a version that was never stored.
        store.put_task(&test_task("orphan", "v-missing", "ubuntu")).unwrap();

        let outcome = scheduler.run_pass().await;

        // The missing version is reported once and does not block the
        // healthy distro's queue.
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0],
            PassError::Config { version_id, .. } if version_id == "v-missing"
        ));
        let queue = store.get_task_queue("ubuntu1404-test").unwrap().unwrap();
        assert_eq!(queue.items.len(), 3);
        assert_eq!(
            store.get_task("orphan").unwrap().unwrap().status,
            TaskStatus::Unscheduled
        );
    }

    #[tokio::test]
    async fn unknown_run_on_distro_leaves_tasks_unscheduled() {
        let (store, scheduler, cloud) = test_scheduler();
        store
            .put_version(&Version {
                id: "v1".to_string(),
                project: "mci".to_string(),
                config: r#"
[[buildvariants]]
name = "ubuntu"
run_on = ["ghost-distro"]
tasks = ["agent"]
"#
                .to_string(),
                create_time: 1000,
            })
            .unwrap();
        store.put_task(&test_task("agent", "v1", "ubuntu")).unwrap();

        let outcome = scheduler.run_pass().await;

        // The bad distro reference is reported, not silently absorbed.
        assert!(!outcome.is_healthy());
        assert!(matches!(
            &outcome.errors[0],
            PassError::UnknownDistro(d) if d == "ghost-distro"
        ));

        // No queue, no claim, no provider calls: the task must stay
        // eligible so a later pass (after the distro is registered) can
        // pick it up.
        assert!(store.get_task_queue("ghost-distro").unwrap().is_none());
        let agent = store.get_task("agent").unwrap().unwrap();
        assert_eq!(agent.status, TaskStatus::Unscheduled);
        assert_eq!(agent.distro_id, "");
        assert_eq!(cloud.total_spawn_calls(), 0);

        // Registering the distro heals the next pass.
        store.put_distro(&test_distro("ghost-distro", 10)).unwrap();
        let second = scheduler.run_pass().await;
        assert!(second.is_healthy(), "errors: {:?}", second.errors);
        assert_eq!(
            store.get_task("agent").unwrap().unwrap().status,
            TaskStatus::Queued
        );
    }

    #[tokio::test]
    async fn empty_store_pass_is_healthy_and_idle() {
        let (_store, scheduler, cloud) = test_scheduler();

        let outcome = scheduler.run_pass().await;

        assert!(outcome.is_healthy());
        assert_eq!(outcome.total_spawned(), 0);
        assert_eq!(cloud.total_spawn_calls(), 0);
    }

    #[tokio::test]
    async fn allocator_failure_blocks_all_spawning() {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(MockCloud::new());
        let mut clouds = CloudRegistry::new();
        clouds.register("mock", cloud.clone());
        // Unusable capacity settings: the allocator must refuse to guess.
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 0.0,
            ..SchedulerSettings::default()
        };
        let scheduler = Scheduler::new(store.clone(), settings, clouds);

        seed_ubuntu_version(&store);
        store.put_distro(&test_distro("ubuntu1404-test", 10)).unwrap();

        let outcome = scheduler.run_pass().await;

        // The queue was still persisted (pipeline ran), but no hosts
        // were spawned anywhere.
        assert!(store.get_task_queue("ubuntu1404-test").unwrap().is_some());
        assert!(outcome.hosts_spawned.is_empty());
        assert_eq!(cloud.total_spawn_calls(), 0);
        assert!(
            outcome
                .errors
                .iter()
                .any(|e| matches!(e, PassError::Allocator(_)))
        );
    }

    #[tokio::test]
    async fn pool_limit_caps_spawning() {
        let (store, scheduler, cloud) = test_scheduler();
        seed_ubuntu_version(&store);
        store.put_distro(&test_distro("ubuntu1404-test", 1)).unwrap();

        let outcome = scheduler.run_pass().await;
        assert!(outcome.is_healthy(), "errors: {:?}", outcome.errors);

        // Pool of one: never more than one host regardless of queue depth.
        assert!(cloud.spawn_calls("ubuntu1404-test") <= 1);
        assert!(store.active_host_count("ubuntu1404-test").unwrap() <= 1);
    }
}
