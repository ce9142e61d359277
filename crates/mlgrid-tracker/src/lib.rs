//! mlgrid-tracker — per-host resource accounting.
//!
//! Two cooperating pieces:
//!
//! - **`claim`** — `ClaimTable`, the keyed per-host capacity ledger.
//!   A `Claim` reserves capacity immediately and must end in exactly
//!   one of commit (capacity stays deducted, model tagged with the
//!   host) or release (capacity restored); an uncommitted claim
//!   releases itself on drop, so unwinding cannot leak capacity.
//! - **`tracker`** — `HostTracker`, the per-host singleton that
//!   registers the host on first contact and refreshes its inventory
//!   from the deployment driver.
//!
//! All read-modify-write of one host's record — claims, refunds, and
//! inventory refreshes — serializes through that host's entry in the
//! `ClaimTable`, so a claim can never read capacity mid-refresh.

pub mod claim;
pub mod error;
pub mod tracker;

pub use claim::{Claim, ClaimTable};
pub use error::{TrackerError, TrackerResult};
pub use tracker::HostTracker;
