//! Scheduler error types.

use thiserror::Error;

/// Result type alias for scheduling operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur while selecting a host.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No registered host satisfies the request and hints. The caller
    /// marks the model ERROR with a human-readable reason; there is no
    /// automatic retry.
    #[error("no valid host was found")]
    NoValidHost,

    #[error("tracker error: {0}")]
    Tracker(#[from] mlgrid_tracker::TrackerError),

    #[error("registry error: {0}")]
    Registry(#[from] mlgrid_registry::RegistryError),
}
