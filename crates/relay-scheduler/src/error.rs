//! Scheduler error types.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors produced by individual pipeline stages.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("build variant {variant} not found in version {version_id}")]
    VariantNotFound { version_id: String, variant: String },

    #[error("failed to parse configuration of version {version_id}: {message}")]
    ConfigParse { version_id: String, message: String },

    #[error("no run_on distros for variant {variant} of version {version_id}")]
    NoRunOnDistro { version_id: String, variant: String },

    #[error("no expected duration for task {0}")]
    MissingDuration(String),

    #[error("state store error: {0}")]
    State(#[from] relay_state::StateError),
}
