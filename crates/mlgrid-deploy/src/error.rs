//! Deployment state machine error types.

use thiserror::Error;

use mlgrid_registry::ModelStatus;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while driving the model lifecycle.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The requested action is not allowed from the model's current
    /// status. The record is left untouched.
    #[error("cannot {action} model {model} in state {status}")]
    InvalidState {
        model: String,
        status: ModelStatus,
        action: &'static str,
    },

    /// The model has no flavor, so its resource request is undefined.
    #[error("model {0} has no flavor")]
    MissingFlavor(String),

    /// No host could satisfy the request. The model has already been
    /// moved to ERROR with a reason by the time this is returned.
    #[error("no valid host was found")]
    NoValidHost,

    #[error("registry error: {0}")]
    Registry(#[from] mlgrid_registry::RegistryError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] mlgrid_scheduler::SchedulerError),

    #[error("tracker error: {0}")]
    Tracker(#[from] mlgrid_tracker::TrackerError),

    #[error("compute error: {0}")]
    Compute(#[from] mlgrid_compute::ComputeError),

    #[error("provisioner error: {0}")]
    Provision(#[from] crate::provisioner::ProvisionError),
}
