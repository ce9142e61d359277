//! Compute layer error types.

use thiserror::Error;

/// Result type alias for compute operations.
pub type ComputeResult<T> = Result<T, ComputeError>;

/// Errors that can occur in the driver / manager / RPC layer.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The model has no assigned host yet. Routing before scheduling
    /// is a state-machine invariant violation, not a user error.
    #[error("model {0} has no assigned host")]
    HostNotAssigned(String),

    /// The target host's manager is unreachable. Callers surface this
    /// as "server not usable", not as a raw transport error.
    #[error("host {0} is not up")]
    HostNotUp(String),

    /// The manager does not know the model (never created or already
    /// removed on that host).
    #[error("model {0} is not running on this host")]
    ModelNotRunning(String),

    #[error("unknown driver kind: {0}")]
    UnknownDriver(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("driver error: {0}")]
    Driver(String),
}
