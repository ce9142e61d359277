//! mlgrid-core — shared building blocks for the mlgrid control plane.
//!
//! This crate holds the pieces every other mlgrid crate leans on:
//!
//! - **`config`** — `mlgrid.toml` parsing (compute host identity,
//!   driver selection, provisioner endpoint, poll intervals)
//! - **`resources`** — resource quantity arithmetic (cpu / memory / disk)
//! - **`sync`** — keyed per-entity async locks (one mutex per model id
//!   or hostname, acquired with scoped guards)

pub mod config;
pub mod resources;
pub mod sync;

pub use config::MlgridConfig;
pub use resources::Resources;
pub use sync::KeyedLocks;
