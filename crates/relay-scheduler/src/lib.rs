//! relay-scheduler — the scheduling pipeline for Relay.
//!
//! One scheduling pass turns the set of runnable tasks into per-distro
//! ranked queues and drives host creation to service them:
//!
//! ```text
//! Scheduler::run_pass
//!   ├── TaskFinder            all runnable tasks, across distros
//!   ├── VariantCache          per-pass (version, variant) resolution
//!   ├── per distro:
//!   │     TaskPrioritizer     deterministic total order
//!   │     TaskDurationEstimator  history-based expected durations
//!   │     TaskQueuePersister  atomic whole-queue replace
//!   ├── HostAllocator         global capacity math (relay-allocate)
//!   └── spawn_hosts           provider calls via CloudRegistry
//! ```
//!
//! Failures are isolated per distro: one distro's bad configuration or
//! failed persistence is recorded in the pass outcome and its siblings
//! proceed. Only two failures abort more than a distro — the finder
//! (no data to work with) and the allocator (the sole capacity gate).

pub mod error;
pub mod estimator;
pub mod finder;
pub mod persister;
pub mod prioritizer;
pub mod scheduler;
pub mod variant_cache;

pub use error::{SchedError, SchedResult};
pub use estimator::{PastRunsEstimator, TaskDurationEstimator};
pub use finder::{DbTaskFinder, TaskFinder};
pub use persister::{DbQueuePersister, TaskQueuePersister};
pub use prioritizer::{CmpBasedPrioritizer, TaskPrioritizer};
pub use scheduler::{PassError, PassOutcome, PipelineStage, Scheduler};
pub use variant_cache::{BuildVariant, VariantCache};
