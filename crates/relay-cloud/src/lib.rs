//! relay-cloud — cloud provider surface for Relay.
//!
//! The scheduling core never talks to a provider SDK directly; it depends
//! only on the [`CloudManager`] capability trait. One implementation exists
//! per provider, selected at runtime through a [`CloudRegistry`] keyed by
//! the distro's provider field.
//!
//! Two providers ship in-tree:
//!
//! - [`MockCloud`] — in-memory provider with call counting and per-distro
//!   failure injection, used throughout the test suites.
//! - [`StaticCloud`] — a fixed pool of pre-provisioned machines; "spawning"
//!   draws from the pool, terminating returns to it.

pub mod error;
pub mod manager;
pub mod mock;
pub mod static_pool;

pub use error::{CloudError, CloudResult};
pub use manager::{CloudManager, CloudRegistry};
pub use mock::MockCloud;
pub use static_pool::StaticCloud;
