//! Static provider — a fixed pool of pre-provisioned machines.
//!
//! Some distros run on hardware that already exists (lab machines, long
//! lived VMs). "Spawning" a host for such a distro draws the next free
//! machine from its configured pool; terminating returns it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use relay_state::{Host, HostStatus};

use crate::error::{CloudError, CloudResult};
use crate::manager::CloudManager;

/// Cloud manager over pre-provisioned machines, keyed by distro.
pub struct StaticCloud {
    /// Distro id → free machine DNS names, in hand-out order.
    pools: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticCloud {
    /// Build a static provider from per-distro machine lists.
    pub fn new(pools: HashMap<String, Vec<String>>) -> Self {
        Self {
            pools: Mutex::new(pools),
        }
    }

    /// Free machines remaining for a distro.
    pub fn available(&self, distro_id: &str) -> usize {
        let pools = self.pools.lock().expect("static pools poisoned");
        pools.get(distro_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl CloudManager for StaticCloud {
    async fn start_instance(&self, _distro_id: &str) -> CloudResult<()> {
        // Static machines are always on.
        Ok(())
    }

    async fn spawn_instance(&self, distro_id: &str, _config_dir: &str) -> CloudResult<Host> {
        let mut pools = self.pools.lock().expect("static pools poisoned");
        let pool = pools
            .get_mut(distro_id)
            .ok_or_else(|| CloudError::PoolExhausted(distro_id.to_string()))?;
        let dns_name = pool
            .pop()
            .ok_or_else(|| CloudError::PoolExhausted(distro_id.to_string()))?;

        debug!(%distro_id, %dns_name, "static machine handed out");
        Ok(Host {
            id: dns_name.clone(),
            distro_id: distro_id.to_string(),
            // Pre-provisioned machines skip the boot phase.
            status: HostStatus::Running,
            dns_name: dns_name.clone(),
            instance_id: dns_name,
            created_at: epoch_secs(),
        })
    }

    async fn get_instance_status(&self, _host: &Host) -> CloudResult<HostStatus> {
        Ok(HostStatus::Running)
    }

    async fn get_instance_dns(&self, host: &Host) -> CloudResult<String> {
        Ok(host.dns_name.clone())
    }

    async fn reconcile_instance_lists(&self) -> CloudResult<bool> {
        Ok(false)
    }

    async fn stop_instance(&self, _host: &Host) -> CloudResult<()> {
        Ok(())
    }

    async fn terminate_instance(&self, host: &Host) -> CloudResult<()> {
        let mut pools = self.pools.lock().expect("static pools poisoned");
        pools
            .entry(host.distro_id.clone())
            .or_default()
            .push(host.dns_name.clone());
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
