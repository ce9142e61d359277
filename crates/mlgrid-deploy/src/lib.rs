//! mlgrid-deploy — the deployment state machine.
//!
//! Drives a model through
//! `Created → Scheduled → DeploymentStarted → DeployedComputeNode →
//! Deployed`, polling an external, eventually-consistent provisioner
//! until the backing infrastructure converges and the provisioned node
//! shows up in the host registry. Undeploy, delete, and restart
//! recovery live here too.
//!
//! # Components
//!
//! - **`provisioner`** — the minimal create-stack/get-stack contract
//!   plus the HTTP implementation
//! - **`mock`** — in-process provisioner double for tests
//! - **`deployer`** — the state machine itself: per-model serialized
//!   operations, cancellable polling tasks, claim refunds

pub mod deployer;
pub mod error;
pub mod mock;
pub mod provisioner;

pub use deployer::Deployer;
pub use error::{DeployError, DeployResult};
pub use mock::MockProvisioner;
pub use provisioner::{HttpProvisioner, Provisioner, Stack, StackOutput, StackStatus};
