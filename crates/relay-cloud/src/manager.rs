//! The `CloudManager` capability trait and provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use relay_state::{Distro, Host, HostStatus};

use crate::error::{CloudError, CloudResult};

/// Capability surface the scheduling core requires from a cloud provider.
///
/// Implementations wrap one provider's API. Calls are expected to block on
/// network I/O; failures surface as [`CloudError::Provider`] and are
/// retried on the next scheduling pass rather than inline.
#[async_trait]
pub trait CloudManager: Send + Sync {
    /// Boot a stopped instance for the given distro.
    async fn start_instance(&self, distro_id: &str) -> CloudResult<()>;

    /// Create one new instance for the given distro and return the host
    /// record as acknowledged by the provider. The returned host is tagged
    /// with its owning distro immediately; it is not yet running.
    async fn spawn_instance(&self, distro_id: &str, config_dir: &str) -> CloudResult<Host>;

    /// Query the provider for an instance's current lifecycle status.
    async fn get_instance_status(&self, host: &Host) -> CloudResult<HostStatus>;

    /// Query the provider for an instance's DNS name.
    async fn get_instance_dns(&self, host: &Host) -> CloudResult<String>;

    /// Reconcile the provider's instance list against our records.
    /// Returns true if anything changed on the provider side.
    async fn reconcile_instance_lists(&self) -> CloudResult<bool>;

    /// Stop a running instance without destroying it.
    async fn stop_instance(&self, host: &Host) -> CloudResult<()>;

    /// Destroy an instance permanently.
    async fn terminate_instance(&self, host: &Host) -> CloudResult<()>;
}

/// Maps provider keys (the `Distro::provider` field) to cloud managers.
#[derive(Clone, Default)]
pub struct CloudRegistry {
    managers: HashMap<String, Arc<dyn CloudManager>>,
}

impl CloudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager under a provider key, replacing any previous one.
    pub fn register(&mut self, provider: impl Into<String>, manager: Arc<dyn CloudManager>) {
        self.managers.insert(provider.into(), manager);
    }

    /// Whether a manager is registered under the given provider key.
    pub fn contains(&self, provider: &str) -> bool {
        self.managers.contains_key(provider)
    }

    /// Look up the manager serving a distro's provider.
    pub fn manager_for(&self, distro: &Distro) -> CloudResult<Arc<dyn CloudManager>> {
        self.managers
            .get(&distro.provider)
            .cloned()
            .ok_or_else(|| CloudError::UnknownProvider(distro.provider.clone()))
    }
}
