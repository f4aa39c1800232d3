//! Per-pass build-variant resolution cache.
//!
//! A version's configuration blob is parsed at most once per pass no
//! matter how many of its tasks are runnable. The cache is created at
//! pass start, passed explicitly through the pipeline, and discarded at
//! pass end — never a process-wide singleton.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::debug;

use relay_state::{StateStore, VersionId};

use crate::error::{SchedError, SchedResult};

/// A build variant resolved from a version's configuration.
///
/// Ephemeral: derived each pass, never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildVariant {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Distros this variant's tasks may run on, in preference order.
    #[serde(default)]
    pub run_on: Vec<String>,
    /// Ordered task names belonging to this variant.
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Expansion key/value pairs substituted into task commands.
    #[serde(default)]
    pub expansions: HashMap<String, String>,
}

/// Shape of a version's raw configuration blob.
#[derive(Debug, Deserialize)]
struct ProjectConfig {
    #[serde(default)]
    buildvariants: Vec<BuildVariant>,
}

/// Pass-scoped cache of (version id, variant name) → resolved variant.
#[derive(Default)]
pub struct VariantCache {
    entries: HashMap<(VersionId, String), BuildVariant>,
    /// Versions whose configuration has already been loaded and parsed.
    loaded: HashSet<VersionId>,
}

impl VariantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a build variant, loading and parsing the version's
    /// configuration on first touch.
    ///
    /// A miss (unknown version, absent variant) returns an error without
    /// disturbing entries cached for other keys.
    pub fn resolve(
        &mut self,
        store: &StateStore,
        version_id: &str,
        variant: &str,
    ) -> SchedResult<&BuildVariant> {
        if !self.loaded.contains(version_id) {
            self.load_version(store, version_id)?;
        }

        let key = (version_id.to_string(), variant.to_string());
        self.entries
            .get(&key)
            .ok_or_else(|| SchedError::VariantNotFound {
                version_id: version_id.to_string(),
                variant: variant.to_string(),
            })
    }

    /// Number of distinct cached variants (for tests and pass summaries).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a version and cache every variant it defines.
    fn load_version(&mut self, store: &StateStore, version_id: &str) -> SchedResult<()> {
        let version = store
            .get_version(version_id)?
            .ok_or_else(|| SchedError::VersionNotFound(version_id.to_string()))?;

        let config: ProjectConfig =
            toml::from_str(&version.config).map_err(|e| SchedError::ConfigParse {
                version_id: version_id.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            %version_id,
            variants = config.buildvariants.len(),
            "version configuration parsed"
        );
        for variant in config.buildvariants {
            self.entries
                .insert((version_id.to_string(), variant.name.clone()), variant);
        }
        self.loaded.insert(version_id.to_string());
        Ok(())
    }
}
