//! relay-state — embedded state store for Relay.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for tasks, versions, distros, hosts, and per-distro
//! task queues.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Hosts use composite keys (`{distro_id}:{host_id}`) so a distro's fleet
//! can be read with a prefix scan; task queues are keyed by distro id and
//! replaced wholesale, never merged.
//!
//! Status transitions go through compare-and-swap operations that only
//! apply when the record is still in the expected prior state, so two
//! actors racing on the same task or host resolve to exactly one winner.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
