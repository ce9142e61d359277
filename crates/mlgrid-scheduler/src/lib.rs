//! mlgrid-scheduler — picks exactly one host for a model.
//!
//! Given a model's resource request (derived from its flavor) and its
//! hint map, the scheduler filters the registered hosts down to the
//! feasible set, ranks the survivors least-loaded first (ties broken
//! by hostname so scheduling is reproducible under test), and claims
//! capacity on the winner through the `ClaimTable`.
//!
//! The returned `Claim` is the correctness-critical handle: the caller
//! commits it once the model record is updated, or lets it release on
//! any failure path.

pub mod error;
pub mod filter;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use filter::{feasible, rank_hosts};
pub use scheduler::Scheduler;
