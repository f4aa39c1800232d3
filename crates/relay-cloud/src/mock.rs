//! In-memory mock provider with call counting and failure injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use relay_state::{Host, HostStatus};

use crate::error::{CloudError, CloudResult};
use crate::manager::CloudManager;

#[derive(Default)]
struct MockState {
    /// Number of spawn calls seen per distro (including failed ones).
    spawn_calls: HashMap<String, u32>,
    /// Remaining injected spawn failures per distro.
    fail_spawns: HashMap<String, u32>,
    /// Hosts this provider has handed out, by host id.
    hosts: HashMap<String, Host>,
    /// Monotonic counter for instance ids.
    next_instance: u64,
}

/// A provider that exists only in memory.
///
/// Spawn calls succeed instantly unless a failure has been injected with
/// [`MockCloud::fail_next_spawns`]. Every call is counted so tests can
/// assert exactly how many provider requests a pass issued.
#[derive(Default)]
pub struct MockCloud {
    state: Mutex<MockState>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject `count` spawn failures for a distro. Each failing call
    /// consumes one; subsequent calls succeed again.
    pub fn fail_next_spawns(&self, distro_id: &str, count: u32) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.fail_spawns.insert(distro_id.to_string(), count);
    }

    /// How many spawn calls this provider has seen for a distro.
    pub fn spawn_calls(&self, distro_id: &str) -> u32 {
        let state = self.state.lock().expect("mock state poisoned");
        state.spawn_calls.get(distro_id).copied().unwrap_or(0)
    }

    /// Total spawn calls across all distros.
    pub fn total_spawn_calls(&self) -> u32 {
        let state = self.state.lock().expect("mock state poisoned");
        state.spawn_calls.values().sum()
    }
}

#[async_trait]
impl CloudManager for MockCloud {
    async fn start_instance(&self, _distro_id: &str) -> CloudResult<()> {
        Ok(())
    }

    async fn spawn_instance(&self, distro_id: &str, _config_dir: &str) -> CloudResult<Host> {
        let mut state = self.state.lock().expect("mock state poisoned");
        *state.spawn_calls.entry(distro_id.to_string()).or_insert(0) += 1;

        if let Some(remaining) = state.fail_spawns.get_mut(distro_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(CloudError::Provider(format!(
                "injected spawn failure for {distro_id}"
            )));
        }

        state.next_instance += 1;
        let n = state.next_instance;
        let host = Host {
            id: format!("{distro_id}-host-{n}"),
            distro_id: distro_id.to_string(),
            status: HostStatus::Uninitialized,
            dns_name: String::new(),
            instance_id: format!("mock-i-{n}"),
            created_at: epoch_secs(),
        };
        state.hosts.insert(host.id.clone(), host.clone());
        debug!(%distro_id, host_id = %host.id, "mock instance spawned");
        Ok(host)
    }

    async fn get_instance_status(&self, host: &Host) -> CloudResult<HostStatus> {
        let state = self.state.lock().expect("mock state poisoned");
        state
            .hosts
            .get(&host.id)
            .map(|h| h.status)
            .ok_or_else(|| CloudError::HostNotFound(host.id.clone()))
    }

    async fn get_instance_dns(&self, host: &Host) -> CloudResult<String> {
        Ok(format!("{}.mock.internal", host.id))
    }

    async fn reconcile_instance_lists(&self) -> CloudResult<bool> {
        Ok(false)
    }

    async fn stop_instance(&self, _host: &Host) -> CloudResult<()> {
        Ok(())
    }

    async fn terminate_instance(&self, host: &Host) -> CloudResult<()> {
        let mut state = self.state.lock().expect("mock state poisoned");
        match state.hosts.get_mut(&host.id) {
            Some(h) => {
                h.status = HostStatus::Terminated;
                Ok(())
            }
            None => Err(CloudError::HostNotFound(host.id.clone())),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
