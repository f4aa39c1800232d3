//! Host allocation strategies.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use relay_state::SchedulerSettings;

/// Result type alias for allocation operations.
pub type AllocateResult<T> = Result<T, AllocateError>;

/// Errors that can occur while computing host needs.
///
/// Allocation failure is fatal to the spawn stage of a pass: without safe
/// bounds the spawner must not run.
#[derive(Debug, Error)]
pub enum AllocateError {
    #[error("invalid allocator input: {0}")]
    InvalidInput(String),

    #[error("invalid allocator settings: {0}")]
    InvalidSettings(String),
}

/// Per-distro capacity snapshot consumed by allocators.
#[derive(Debug, Clone)]
pub struct DistroCapacity {
    pub distro_id: String,
    /// Hard cap on this distro's host count.
    pub pool_size: u32,
    /// Non-terminated hosts currently in the pool.
    pub running_hosts: u32,
    /// Number of tasks in this pass's persisted queue.
    pub queue_length: u32,
    /// Sum of expected durations across the queue (seconds).
    pub queued_duration_secs: f64,
}

/// Aggregated input to one allocation run, covering every distro whose
/// queue was successfully persisted this pass.
#[derive(Debug, Clone, Default)]
pub struct AllocatorData {
    pub distros: Vec<DistroCapacity>,
}

/// Capacity policy: how many new hosts each distro needs.
///
/// Implementations must never return a count that would push a distro past
/// its pool size.
pub trait HostAllocator: Send + Sync {
    fn hosts_needed(
        &self,
        data: &AllocatorData,
        settings: &SchedulerSettings,
    ) -> AllocateResult<HashMap<String, u32>>;
}

/// Clamp a desired target host count to what the distro's pool permits.
fn clamp_to_pool(target: u32, capacity: &DistroCapacity) -> u32 {
    let headroom = capacity.pool_size.saturating_sub(capacity.running_hosts);
    target.saturating_sub(capacity.running_hosts).min(headroom)
}

// ── Duration-based allocator ──────────────────────────────────────

/// Default allocator: size each pool so that the queued work drains within
/// `target_duration_per_host_secs` per host.
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationBasedAllocator;

impl HostAllocator for DurationBasedAllocator {
    fn hosts_needed(
        &self,
        data: &AllocatorData,
        settings: &SchedulerSettings,
    ) -> AllocateResult<HashMap<String, u32>> {
        if settings.target_duration_per_host_secs <= 0.0 {
            return Err(AllocateError::InvalidSettings(format!(
                "target_duration_per_host_secs must be positive, got {}",
                settings.target_duration_per_host_secs
            )));
        }

        let mut needed = HashMap::new();
        for capacity in &data.distros {
            if capacity.queued_duration_secs < 0.0 {
                return Err(AllocateError::InvalidInput(format!(
                    "negative queued duration for distro {}",
                    capacity.distro_id
                )));
            }

            let count = if capacity.queue_length == 0 {
                0
            } else {
                let by_duration = (capacity.queued_duration_secs
                    / settings.target_duration_per_host_secs)
                    .ceil() as u32;
                // At least one host for a non-empty queue, never more
                // hosts than queued tasks.
                let target = by_duration.clamp(1, capacity.queue_length);
                clamp_to_pool(target, capacity)
            };

            debug!(
                distro_id = %capacity.distro_id,
                queue_length = capacity.queue_length,
                running = capacity.running_hosts,
                pool_size = capacity.pool_size,
                needed = count,
                "host need computed"
            );
            needed.insert(capacity.distro_id.clone(), count);
        }
        Ok(needed)
    }
}

// ── Queue-depth allocator ─────────────────────────────────────────

/// Simpler policy: one host per queued task, ignoring durations.
/// Useful for distros whose tasks are uniformly short.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueDepthAllocator;

impl HostAllocator for QueueDepthAllocator {
    fn hosts_needed(
        &self,
        data: &AllocatorData,
        _settings: &SchedulerSettings,
    ) -> AllocateResult<HashMap<String, u32>> {
        let mut needed = HashMap::new();
        for capacity in &data.distros {
            let count = clamp_to_pool(capacity.queue_length, capacity);
            needed.insert(capacity.distro_id.clone(), count);
        }
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(
        distro_id: &str,
        pool_size: u32,
        running: u32,
        queue_length: u32,
        duration: f64,
    ) -> DistroCapacity {
        DistroCapacity {
            distro_id: distro_id.to_string(),
            pool_size,
            running_hosts: running,
            queue_length,
            queued_duration_secs: duration,
        }
    }

    fn data_of(distros: Vec<DistroCapacity>) -> AllocatorData {
        AllocatorData { distros }
    }

    #[test]
    fn empty_queue_needs_nothing() {
        let data = data_of(vec![capacity("d1", 10, 2, 0, 0.0)]);
        let needed = DurationBasedAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert_eq!(needed["d1"], 0);
    }

    #[test]
    fn nonempty_queue_with_no_hosts_needs_at_least_one() {
        // A single 10-second task still warrants one host.
        let data = data_of(vec![capacity("d1", 10, 0, 1, 10.0)]);
        let needed = DurationBasedAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert_eq!(needed["d1"], 1);
    }

    #[test]
    fn deep_queue_scales_by_duration() {
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 1800.0,
            ..SchedulerSettings::default()
        };
        // 3 hours of queued work at 30 minutes per host: 6 hosts.
        let data = data_of(vec![capacity("d1", 20, 0, 12, 10800.0)]);
        let needed = DurationBasedAllocator.hosts_needed(&data, &settings).unwrap();
        assert_eq!(needed["d1"], 6);
    }

    #[test]
    fn running_hosts_offset_the_target() {
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 1800.0,
            ..SchedulerSettings::default()
        };
        // Target of 6, 4 already running.
        let data = data_of(vec![capacity("d1", 20, 4, 12, 10800.0)]);
        let needed = DurationBasedAllocator.hosts_needed(&data, &settings).unwrap();
        assert_eq!(needed["d1"], 2);
    }

    #[test]
    fn never_exceeds_pool_size() {
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 60.0,
            ..SchedulerSettings::default()
        };
        // Wants far more than the pool allows.
        let data = data_of(vec![capacity("d1", 5, 3, 100, 100_000.0)]);
        let needed = DurationBasedAllocator.hosts_needed(&data, &settings).unwrap();
        assert_eq!(needed["d1"], 2);
        assert!(needed["d1"] + 3 <= 5);
    }

    #[test]
    fn at_pool_limit_yields_zero() {
        let data = data_of(vec![capacity("d1", 4, 4, 50, 99_999.0)]);
        let needed = DurationBasedAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert_eq!(needed["d1"], 0);
    }

    #[test]
    fn over_pool_limit_yields_zero_not_negative() {
        // Reconciliation lag can leave more hosts than the limit allows.
        let data = data_of(vec![capacity("d1", 4, 6, 50, 99_999.0)]);
        let needed = DurationBasedAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert_eq!(needed["d1"], 0);
    }

    #[test]
    fn never_more_hosts_than_queued_tasks() {
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 1.0,
            ..SchedulerSettings::default()
        };
        // Duration math alone would want 3600 hosts for 2 tasks.
        let data = data_of(vec![capacity("d1", 100, 0, 2, 3600.0)]);
        let needed = DurationBasedAllocator.hosts_needed(&data, &settings).unwrap();
        assert_eq!(needed["d1"], 2);
    }

    #[test]
    fn distros_computed_independently() {
        let data = data_of(vec![
            capacity("d1", 10, 0, 3, 1800.0),
            capacity("d2", 10, 10, 3, 1800.0),
            capacity("d3", 10, 0, 0, 0.0),
        ]);
        let needed = DurationBasedAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert!(needed["d1"] >= 1);
        assert_eq!(needed["d2"], 0);
        assert_eq!(needed["d3"], 0);
    }

    #[test]
    fn bad_settings_are_an_error_not_a_guess() {
        let settings = SchedulerSettings {
            target_duration_per_host_secs: 0.0,
            ..SchedulerSettings::default()
        };
        let data = data_of(vec![capacity("d1", 10, 0, 3, 1800.0)]);
        let result = DurationBasedAllocator.hosts_needed(&data, &settings);
        assert!(matches!(result, Err(AllocateError::InvalidSettings(_))));
    }

    #[test]
    fn queue_depth_allocator_clamps_to_pool() {
        let data = data_of(vec![capacity("d1", 5, 2, 10, 0.0)]);
        let needed = QueueDepthAllocator
            .hosts_needed(&data, &SchedulerSettings::default())
            .unwrap();
        assert_eq!(needed["d1"], 3);
    }
}
