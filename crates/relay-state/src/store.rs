//! StateStore — redb-backed state persistence for Relay.
//!
//! Provides typed CRUD operations over tasks, versions, distros, hosts,
//! and per-distro task queues. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).
//!
//! Two operations carry scheduling-correctness weight beyond plain CRUD:
//!
//! - [`StateStore::replace_task_queue`] replaces a distro's queue wholesale
//!   inside one write transaction and rejects stamps older than the stored
//!   queue, so a slow pass can never clobber a faster, later one.
//! - The `transition_*` / `mark_task_queued` operations are compare-and-swap:
//!   they apply only if the record is still in the expected prior state, and
//!   report a lost race as `Ok(false)` rather than an error.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(DISTROS).map_err(map_err!(Table))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(TASK_QUEUES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Insert or update a task.
    pub fn put_task(&self, task: &Task) -> StateResult<()> {
        let value = serde_json::to_vec(task).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            table
                .insert(task.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        match table.get(task_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let task: Task =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// List all tasks.
    pub fn list_tasks(&self) -> StateResult<Vec<Task>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let task: Task =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(task);
        }
        Ok(results)
    }

    /// Observed runtimes (seconds) of finished tasks sharing a project and
    /// display name. Feeds duration estimation.
    pub fn finished_durations(&self, project: &str, display_name: &str) -> StateResult<Vec<f64>> {
        let tasks = self.list_tasks()?;
        Ok(tasks
            .iter()
            .filter(|t| t.project == project && t.display_name == display_name)
            .filter_map(Task::observed_duration_secs)
            .collect())
    }

    /// Atomically move a task from unscheduled to queued, recording its
    /// distro assignment and expected duration in the same transaction.
    ///
    /// Returns `Ok(false)` without modifying anything if the task is no
    /// longer unscheduled (another pass got there first).
    pub fn mark_task_queued(
        &self,
        task_id: &str,
        distro_id: &str,
        expected_duration_secs: f64,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let transitioned;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            let mut task: Task = match table.get(task_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("task {task_id}"))),
            };
            if task.status == TaskStatus::Unscheduled {
                task.status = TaskStatus::Queued;
                task.distro_id = distro_id.to_string();
                task.expected_duration_secs = Some(expected_duration_secs);
                let value = serde_json::to_vec(&task).map_err(map_err!(Serialize))?;
                table
                    .insert(task_id, value.as_slice())
                    .map_err(map_err!(Write))?;
                transitioned = true;
            } else {
                transitioned = false;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(transitioned)
    }

    /// Compare-and-swap a task's status. Applies only if the task is
    /// currently in `from`; a lost race yields `Ok(false)`.
    pub fn transition_task_status(
        &self,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let transitioned;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            let mut task: Task = match table.get(task_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("task {task_id}"))),
            };
            if task.status == from {
                task.status = to;
                let value = serde_json::to_vec(&task).map_err(map_err!(Serialize))?;
                table
                    .insert(task_id, value.as_slice())
                    .map_err(map_err!(Write))?;
                transitioned = true;
            } else {
                transitioned = false;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(transitioned)
    }

    // ── Versions ───────────────────────────────────────────────────

    /// Insert or update a version.
    pub fn put_version(&self, version: &Version) -> StateResult<()> {
        let value = serde_json::to_vec(version).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            table
                .insert(version.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a version by id.
    pub fn get_version(&self, version_id: &str) -> StateResult<Option<Version>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        match table.get(version_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let version: Version =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    // ── Distros ────────────────────────────────────────────────────

    /// Insert or update a distro.
    pub fn put_distro(&self, distro: &Distro) -> StateResult<()> {
        let value = serde_json::to_vec(distro).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DISTROS).map_err(map_err!(Table))?;
            table
                .insert(distro.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a distro by id.
    pub fn get_distro(&self, distro_id: &str) -> StateResult<Option<Distro>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DISTROS).map_err(map_err!(Table))?;
        match table.get(distro_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let distro: Distro =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(distro))
            }
            None => Ok(None),
        }
    }

    /// List all distros.
    pub fn list_distros(&self) -> StateResult<Vec<Distro>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DISTROS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let distro: Distro =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(distro);
        }
        Ok(results)
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host.
    pub fn put_host(&self, host: &Host) -> StateResult<()> {
        let key = host.table_key();
        let value = serde_json::to_vec(host).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a host by its (distro, host) identity.
    pub fn get_host(&self, distro_id: &str, host_id: &str) -> StateResult<Option<Host>> {
        let key = format!("{distro_id}:{host_id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let host: Host =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(host))
            }
            None => Ok(None),
        }
    }

    /// List all hosts for a given distro.
    pub fn list_hosts_for_distro(&self, distro_id: &str) -> StateResult<Vec<Host>> {
        let prefix = format!("{distro_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let host: Host =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(host);
            }
        }
        Ok(results)
    }

    /// Number of non-terminated hosts in a distro's pool.
    pub fn active_host_count(&self, distro_id: &str) -> StateResult<u32> {
        let hosts = self.list_hosts_for_distro(distro_id)?;
        Ok(hosts.iter().filter(|h| h.is_active()).count() as u32)
    }

    /// Compare-and-swap a host's status. Applies only if the host is
    /// currently in `from`; a lost race yields `Ok(false)`.
    pub fn transition_host_status(
        &self,
        distro_id: &str,
        host_id: &str,
        from: HostStatus,
        to: HostStatus,
    ) -> StateResult<bool> {
        let key = format!("{distro_id}:{host_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let transitioned;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            let mut host: Host = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("host {key}"))),
            };
            if host.status == from {
                host.status = to;
                let value = serde_json::to_vec(&host).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                transitioned = true;
            } else {
                transitioned = false;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(transitioned)
    }

    // ── Task queues ────────────────────────────────────────────────

    /// Replace a distro's task queue wholesale.
    ///
    /// The replace happens in a single write transaction: readers observe
    /// either the old queue or the new one, never a mix. A queue whose
    /// `generated_at` stamp is older than the stored one is rejected with
    /// [`StateError::StaleQueue`]; equal or newer stamps win.
    pub fn replace_task_queue(&self, queue: &TaskQueue) -> StateResult<()> {
        let value = serde_json::to_vec(queue).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASK_QUEUES).map_err(map_err!(Table))?;
            if let Some(guard) = table.get(queue.distro_id.as_str()).map_err(map_err!(Read))? {
                let stored: TaskQueue =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                if stored.generated_at > queue.generated_at {
                    return Err(StateError::StaleQueue {
                        distro_id: queue.distro_id.clone(),
                        offered: queue.generated_at,
                        stored: stored.generated_at,
                    });
                }
            }
            table
                .insert(queue.distro_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(distro_id = %queue.distro_id, items = queue.items.len(), "task queue replaced");
        Ok(())
    }

    /// Get the stored task queue for a distro.
    pub fn get_task_queue(&self, distro_id: &str) -> StateResult<Option<TaskQueue>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASK_QUEUES).map_err(map_err!(Table))?;
        match table.get(distro_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let queue: TaskQueue =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(queue))
            }
            None => Ok(None),
        }
    }
}
