//! relayd.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use relay_state::{Distro, SchedulerSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaydConfig {
    /// Data directory for the persistent state store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds between scheduling passes.
    #[serde(default = "default_pass_interval")]
    pub pass_interval_secs: u64,

    /// Scheduling and capacity tunables.
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Distros to seed into the store at startup. Existing records with
    /// the same id are overwritten.
    #[serde(default)]
    pub distros: Vec<DistroConfig>,

    /// Machines backing the "static" provider, keyed by distro id.
    #[serde(default)]
    pub static_pools: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistroConfig {
    pub id: String,
    pub provider: String,
    pub pool_size: u32,
    #[serde(default)]
    pub provider_settings: HashMap<String, String>,
}

impl DistroConfig {
    pub fn to_distro(&self) -> Distro {
        Distro {
            id: self.id.clone(),
            provider: self.provider.clone(),
            pool_size: self.pool_size,
            provider_settings: self.provider_settings.clone(),
        }
    }
}

impl Default for RelaydConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pass_interval_secs: default_pass_interval(),
            scheduler: SchedulerSettings::default(),
            distros: Vec::new(),
            static_pools: HashMap::new(),
        }
    }
}

impl RelaydConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelaydConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/relay")
}

fn default_pass_interval() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let toml = r#"
data_dir = "/tmp/relay"
pass_interval_secs = 30

[scheduler]
default_task_duration_secs = 300.0
target_duration_per_host_secs = 900.0
patch_priority_boost = 10
config_dir = "/etc/relay"

[[distros]]
id = "ubuntu1404-test"
provider = "static"
pool_size = 4

[distros.provider_settings]
region = "us-east-1"

[static_pools]
"ubuntu1404-test" = ["build1.example.com", "build2.example.com"]
"#;
        let config: RelaydConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/relay"));
        assert_eq!(config.pass_interval_secs, 30);
        assert_eq!(config.scheduler.default_task_duration_secs, 300.0);
        assert_eq!(config.scheduler.patch_priority_boost, 10);

        assert_eq!(config.distros.len(), 1);
        let distro = config.distros[0].to_distro();
        assert_eq!(distro.id, "ubuntu1404-test");
        assert_eq!(distro.provider, "static");
        assert_eq!(distro.pool_size, 4);
        assert_eq!(distro.provider_settings["region"], "us-east-1");

        assert_eq!(config.static_pools["ubuntu1404-test"].len(), 2);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: RelaydConfig = toml::from_str("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/relay"));
        assert_eq!(config.pass_interval_secs, 60);
        assert_eq!(config.scheduler.default_task_duration_secs, 600.0);
        assert!(config.distros.is_empty());
        assert!(config.static_pools.is_empty());
    }

    #[test]
    fn from_file_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayd.toml");
        std::fs::write(&path, "pass_interval_secs = 15\n").unwrap();

        let config = RelaydConfig::from_file(&path).unwrap();
        assert_eq!(config.pass_interval_secs, 15);
    }
}
