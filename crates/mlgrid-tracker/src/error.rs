//! Host tracker error types.

use thiserror::Error;

/// Result type alias for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors that can occur during inventory and claim operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The host exists but does not have enough free capacity for the
    /// request. The scheduler treats this as "try the next host".
    #[error("not enough free capacity on host {host}")]
    ResourcesUnavailable { host: String },

    #[error("registry error: {0}")]
    Registry(#[from] mlgrid_registry::RegistryError),

    #[error("driver error: {0}")]
    Driver(#[from] mlgrid_compute::ComputeError),
}
