//! redb table definitions for the Relay state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Hosts use the composite pattern `{distro_id}:{host_id}` for prefix scans.

use redb::TableDefinition;

/// Tasks keyed by `{task_id}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Versions keyed by `{version_id}`.
pub const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Distros keyed by `{distro_id}`.
pub const DISTROS: TableDefinition<&str, &[u8]> = TableDefinition::new("distros");

/// Hosts keyed by `{distro_id}:{host_id}`.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Task queues keyed by `{distro_id}`, one document per distro.
pub const TASK_QUEUES: TableDefinition<&str, &[u8]> = TableDefinition::new("task_queues");
