//! mlgrid-compute — the per-host side of the control plane.
//!
//! Three pieces live here:
//!
//! - **`driver`** — the `ModelDriver` capability set (create / delete /
//!   show / train / deploy / undeploy / predict / inventory) and the
//!   compile-time `DriverKind` registry selecting a concrete variant
//! - **`manager`** — the per-host task that owns a driver and the set
//!   of models running on that host
//! - **`rpc`** — `ComputeApi`, the message-passing façade that routes
//!   lifecycle calls to the manager of the model's assigned host
//!
//! # Architecture
//!
//! ```text
//! ComputeApi (client side)
//!   └── per-host mpsc channel
//!         └── ComputeManager task
//!               └── ModelDriver (tensorflow | noop)
//! ```

pub mod driver;
pub mod drivers;
pub mod error;
pub mod manager;
pub mod rpc;

pub use driver::{DriverKind, ModelDriver, load_driver};
pub use error::{ComputeError, ComputeResult};
pub use manager::{Command, ComputeManager, ModelPatch, spawn_manager};
pub use rpc::ComputeApi;
