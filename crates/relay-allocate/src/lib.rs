//! relay-allocate — host-need computation for Relay.
//!
//! Given each distro's queue depth, total expected queue duration, running
//! host count, and pool size limit, an allocator decides how many new
//! hosts the spawner should create. It is the sole capacity-safety gate:
//! nothing downstream re-clamps its output, so an allocator that cannot
//! compute safe bounds must fail rather than guess.
//!
//! # Allocation algorithm (duration-based default)
//!
//! ```text
//! for each distro:
//!     if queue is empty:           needed = 0
//!     target = ceil(queued_duration / target_duration_per_host)
//!     target = clamp(target, 1, queue_length)
//!     needed = clamp(target - running, 0, pool_size - running)
//! ```
//!
//! A distro already at (or over) its pool size always yields 0.

pub mod allocator;

pub use allocator::{
    AllocateError, AllocateResult, AllocatorData, DistroCapacity, DurationBasedAllocator,
    HostAllocator, QueueDepthAllocator,
};
