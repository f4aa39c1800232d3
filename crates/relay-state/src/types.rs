//! Domain types for the Relay state store.
//!
//! These types represent the persisted state of tasks, versions, distros,
//! hosts, and per-distro task queues. All types are serializable to/from
//! JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a task.
pub type TaskId = String;

/// Unique identifier for a version (one push or patch submission).
pub type VersionId = String;

/// Unique identifier for a distro (an isolated execution pool).
pub type DistroId = String;

/// Unique identifier for a host within a distro.
pub type HostId = String;

// ── Task ──────────────────────────────────────────────────────────

/// A single unit of work, created by version expansion and scheduled
/// by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub version_id: VersionId,
    pub project: String,
    /// Human-readable task name, shared across versions (duration history key).
    pub display_name: String,
    /// Build variant this task belongs to within its version.
    pub build_variant: String,
    /// Distro assignment. Empty until the pipeline resolves it.
    pub distro_id: DistroId,
    /// Whether this task came from a patch submission or a mainline commit.
    pub requester: Requester,
    /// Task ids that must be finished before this task may run.
    pub depends_on: Vec<TaskId>,
    /// Explicit priority. Higher runs sooner.
    pub priority: i64,
    /// Expected run duration in seconds. None until estimated.
    pub expected_duration_secs: Option<f64>,
    pub status: TaskStatus,
    /// Unix timestamp (seconds) when this task was created.
    pub create_time: u64,
    /// Unix timestamp when execution started (0 until started).
    pub start_time: u64,
    /// Unix timestamp when execution finished (0 until finished).
    pub finish_time: u64,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unscheduled,
    Queued,
    Started,
    Finished,
}

/// Origin of a task's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    Patch,
    Mainline,
}

impl Task {
    /// Observed runtime in seconds, if the task ran to completion.
    pub fn observed_duration_secs(&self) -> Option<f64> {
        (self.status == TaskStatus::Finished && self.finish_time > self.start_time)
            .then(|| (self.finish_time - self.start_time) as f64)
    }
}

// ── Version ───────────────────────────────────────────────────────

/// A submitted revision of a project. Read-only input to scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub id: VersionId,
    pub project: String,
    /// Raw project configuration blob (TOML). Parsed at the resolver boundary.
    pub config: String,
    /// Unix timestamp (seconds) when this version was created.
    pub create_time: u64,
}

// ── Distro ────────────────────────────────────────────────────────

/// An isolated execution pool backed by one cloud provider account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Distro {
    pub id: DistroId,
    /// Provider key used to select a cloud manager (e.g. "mock", "static").
    pub provider: String,
    /// Hard cap on the number of hosts this distro may have.
    pub pool_size: u32,
    /// Provider-specific settings, passed through opaquely.
    pub provider_settings: HashMap<String, String>,
}

// ── Host ──────────────────────────────────────────────────────────

/// A compute host created by the spawner via a cloud manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub distro_id: DistroId,
    pub status: HostStatus,
    /// DNS name, filled in by reconciliation once the provider reports it.
    pub dns_name: String,
    /// Provider-side instance identifier.
    pub instance_id: String,
    /// Unix timestamp (seconds) when the create call was acknowledged.
    pub created_at: u64,
}

/// Lifecycle status of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Uninitialized,
    Starting,
    Running,
    Terminated,
}

impl Host {
    /// Build the composite key for the hosts table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.distro_id, self.id)
    }

    /// Whether this host counts against its distro's pool.
    pub fn is_active(&self) -> bool {
        self.status != HostStatus::Terminated
    }
}

// ── Settings ──────────────────────────────────────────────────────

/// Global scheduling policy knobs, consumed opaquely by the pluggable
/// prioritizer and allocator strategies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Estimate used for tasks with no run history (seconds).
    pub default_task_duration_secs: f64,
    /// How much queued work a single host is expected to absorb (seconds).
    pub target_duration_per_host_secs: f64,
    /// Priority added to patch-submitted tasks over mainline ones.
    pub patch_priority_boost: i64,
    /// Config directory handed to providers when spawning instances.
    pub config_dir: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_task_duration_secs: 600.0,
            target_duration_per_host_secs: 1800.0,
            patch_priority_boost: 50,
            config_dir: "/etc/relay".to_string(),
        }
    }
}

// ── Task queue ────────────────────────────────────────────────────

/// The ranked, per-distro queue produced by one scheduling pass.
/// Replaced wholesale each pass, never appended to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskQueue {
    pub distro_id: DistroId,
    /// Pass stamp (unix millis). A replace with an older stamp is rejected.
    pub generated_at: u64,
    pub items: Vec<TaskQueueItem>,
}

/// One entry of a distro's task queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskQueueItem {
    pub task_id: TaskId,
    pub expected_duration_secs: f64,
    /// Position in the queue, 0 is next to run.
    pub rank: u32,
}

impl TaskQueue {
    /// Sum of expected durations across all queued items.
    pub fn total_expected_duration_secs(&self) -> f64 {
        self.items.iter().map(|i| i.expected_duration_secs).sum()
    }
}
