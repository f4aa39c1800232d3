//! Cloud provider error types.

use thiserror::Error;

/// Result type alias for cloud manager operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur when talking to a cloud provider.
#[derive(Debug, Error)]
pub enum CloudError {
    /// A provider API call failed. Transient; the next pass retries.
    #[error("provider error: {0}")]
    Provider(String),

    /// No cloud manager is registered for the requested provider key.
    #[error("no cloud manager registered for provider: {0}")]
    UnknownProvider(String),

    /// A static pool has no machines left to hand out.
    #[error("static pool exhausted for distro: {0}")]
    PoolExhausted(String),

    /// The host is not known to this provider.
    #[error("host not found: {0}")]
    HostNotFound(String),
}
