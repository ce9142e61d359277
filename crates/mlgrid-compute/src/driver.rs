//! The `ModelDriver` capability set and driver selection.
//!
//! A driver is the polymorphic backend that actually performs model
//! lifecycle operations on a host. Which variant runs is decided once
//! at startup from configuration; `DriverKind` is a closed enum, so an
//! unknown key is a configuration error at parse time rather than a
//! runtime import failure.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use mlgrid_core::Resources;
use mlgrid_registry::Model;

use crate::drivers::{noop::NoopDriver, tensorflow::TensorflowDriver};
use crate::error::{ComputeError, ComputeResult};

/// Supported driver variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Tensorflow,
    Noop,
}

impl FromStr for DriverKind {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tensorflow" => Ok(DriverKind::Tensorflow),
            "noop" => Ok(DriverKind::Noop),
            other => Err(ComputeError::UnknownDriver(other.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Tensorflow => f.write_str("tensorflow"),
            DriverKind::Noop => f.write_str("noop"),
        }
    }
}

/// Backend capability set for running models on a host.
///
/// Implementations must be safe to share across the manager task and
/// the host tracker (inventory refresh calls `get_available_resources`
/// concurrently with lifecycle operations).
#[async_trait]
pub trait ModelDriver: Send + Sync {
    /// Which variant this is (recorded on the host record).
    fn kind(&self) -> DriverKind;

    /// Materialize a model on this host.
    async fn create(&self, model: &Model) -> ComputeResult<()>;

    /// Remove a model from this host.
    async fn delete(&self, model_id: &str, force: bool) -> ComputeResult<()>;

    /// Live state of a model as the driver sees it.
    async fn show(&self, model_id: &str) -> ComputeResult<Model>;

    /// Run a training pass over the model's artifact.
    async fn train(&self, model: &Model) -> ComputeResult<()>;

    /// Start serving the model.
    async fn deploy(&self, model_id: &str) -> ComputeResult<()>;

    /// Stop serving the model.
    async fn undeploy(&self, model_id: &str) -> ComputeResult<()>;

    /// Run inference; takes the raw input blob, returns the raw result.
    async fn predict(&self, model_id: &str, payload: &[u8]) -> ComputeResult<Vec<u8>>;

    /// Report this host's resource capacity.
    async fn get_available_resources(&self, host: &str) -> ComputeResult<Resources>;
}

/// Construct the configured driver variant.
pub fn load_driver(kind: DriverKind, capacity: Resources) -> Arc<dyn ModelDriver> {
    match kind {
        DriverKind::Tensorflow => Arc::new(TensorflowDriver::new(capacity)),
        DriverKind::Noop => Arc::new(NoopDriver::new(capacity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("tensorflow".parse::<DriverKind>().unwrap(), DriverKind::Tensorflow);
        assert_eq!("noop".parse::<DriverKind>().unwrap(), DriverKind::Noop);
    }

    #[test]
    fn unknown_kind_is_config_error() {
        match "pytorch".parse::<DriverKind>() {
            Err(ComputeError::UnknownDriver(kind)) => assert_eq!(kind, "pytorch"),
            other => panic!("expected UnknownDriver, got {other:?}"),
        }
    }
}
