//! mlgrid-registry — durable records for the model control plane.
//!
//! Holds the three persisted record types (`Model`, `ComputeHost`,
//! `Flavor`) and the redb-backed `Registry` providing point-in-time
//! CRUD over them. All mutation of shared state in mlgrid goes through
//! this crate; the tracker, scheduler and deployer never touch the
//! database directly.
//!
//! Unique-key violations (`RegistryError::Duplicate`) are reported
//! distinctly from missing records (`RegistryError::NotFound`) so
//! callers can react to each without string matching.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use store::Registry;
pub use types::*;
