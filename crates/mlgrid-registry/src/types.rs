//! Persisted record types for the model registry.
//!
//! These represent the durable state of ML models, compute hosts, and
//! flavors. All types are serializable to/from JSON for storage in
//! redb tables, and all of them must remain readable across process
//! restarts (a mid-deploy crash is recovered from these records).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use mlgrid_core::Resources;

/// Unique identifier for a model (uuid string).
pub type ModelId = String;

/// Unique identifier for a flavor (uuid string).
pub type FlavorId = String;

/// Unique identifier for a compute host (its hostname).
pub type HostId = String;

// ── Model ─────────────────────────────────────────────────────────

/// Lifecycle status of a model.
///
/// The deployment state machine drives
/// `Created → Scheduled → DeploymentStarted → DeployedComputeNode →
/// Deployed`, with `DeploymentFailed` on provisioning failure,
/// `Undeployed` reachable from `Deployed`, and `Error` reachable from
/// any state on unrecoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Creating,
    Created,
    Scheduled,
    DeploymentStarted,
    DeployedComputeNode,
    Deployed,
    DeploymentFailed,
    Undeployed,
    Error,
}

impl ModelStatus {
    /// States from which `deploy` may be issued.
    pub fn deployable(self) -> bool {
        matches!(
            self,
            ModelStatus::Created | ModelStatus::Undeployed | ModelStatus::Scheduled
        )
    }

    /// States from which `undeploy` may be issued.
    pub fn undeployable(self) -> bool {
        self == ModelStatus::Deployed
    }

    /// A deploy is in flight; plain `delete` is blocked here.
    pub fn mid_deployment(self) -> bool {
        matches!(
            self,
            ModelStatus::DeploymentStarted | ModelStatus::DeployedComputeNode
        )
    }

    /// States in which the model holds committed host capacity. The
    /// assignment is kept across the whole in-flight window so a
    /// restart can refund the right host.
    pub fn holds_capacity(self) -> bool {
        matches!(
            self,
            ModelStatus::Scheduled
                | ModelStatus::DeploymentStarted
                | ModelStatus::DeployedComputeNode
                | ModelStatus::Deployed
        )
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelStatus::Creating => "CREATING",
            ModelStatus::Created => "CREATED",
            ModelStatus::Scheduled => "SCHEDULED",
            ModelStatus::DeploymentStarted => "DEPLOYMENT_STARTED",
            ModelStatus::DeployedComputeNode => "DEPLOYED_COMPUTE_NODE",
            ModelStatus::Deployed => "DEPLOYED",
            ModelStatus::DeploymentFailed => "DEPLOYMENT_FAILED",
            ModelStatus::Undeployed => "UNDEPLOYED",
            ModelStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A registered ML artifact plus its deployment state.
///
/// Invariant: `host` is `Some` iff `status.holds_capacity()` — the
/// assignment appears when the scheduler commits a claim and is
/// cleared on undeploy, failure, and error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub project_id: String,
    pub user_id: String,
    pub status: ModelStatus,
    /// Human-readable explanation of the current status.
    pub status_reason: Option<String>,
    /// Hostname of the assigned compute host (set by the scheduler).
    pub host: Option<HostId>,
    /// Network address of the provisioned node backing this model.
    pub deployed_on: Option<String>,
    /// Serving URL, set once the model reaches `Deployed`.
    pub url: Option<String>,
    /// Resource template reference.
    pub flavor_id: Option<FlavorId>,
    /// Opaque scheduling constraints (`host`, `anti_host`, ...).
    pub hints: HashMap<String, String>,
    /// Trained artifact payload; cleared once deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_data: Option<Vec<u8>>,
    /// Unix timestamp (seconds) when this record was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last mutation.
    pub updated_at: u64,
}

impl Model {
    /// Build a fresh record in `Created` status.
    pub fn new(name: impl Into<String>, project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = epoch_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            status: ModelStatus::Created,
            status_reason: None,
            host: None,
            deployed_on: None,
            url: None,
            flavor_id: None,
            hints: HashMap::new(),
            model_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, recording the reason and touch time.
    pub fn set_status(&mut self, status: ModelStatus, reason: Option<&str>) {
        self.status = status;
        self.status_reason = reason.map(str::to_string);
        if !status.holds_capacity() {
            self.host = None;
        }
        self.updated_at = epoch_secs();
    }
}

// ── ComputeHost ───────────────────────────────────────────────────

/// Availability of a compute host for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Available,
    Unavailable,
}

/// A machine capable of running a deployment driver and serving
/// predictions. Created lazily on first inventory report; never
/// destroyed automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeHost {
    /// Unique hostname (or provisioned node address).
    pub hostname: HostId,
    pub status: HostStatus,
    /// Driver kind serving this host ("tensorflow", "noop").
    pub driver: String,
    /// Total capacity as reported by the driver.
    pub capacity: Resources,
    /// Committed usage across scheduled models.
    pub used: Resources,
    /// Unix timestamp (seconds) of the last successful inventory.
    pub last_inventory: u64,
}

impl ComputeHost {
    pub fn new(hostname: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            status: HostStatus::Available,
            driver: driver.into(),
            capacity: Resources::default(),
            used: Resources::default(),
            last_inventory: 0,
        }
    }

    /// Capacity not yet committed to any model.
    pub fn free(&self) -> Resources {
        self.capacity.saturating_sub(&self.used)
    }
}

// ── Flavor ────────────────────────────────────────────────────────

/// Named resource-requirement template for a model.
///
/// Immutable once created — there is no update operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flavor {
    pub id: FlavorId,
    pub name: String,
    pub project_id: String,
    pub cpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub python_version: String,
    /// Driver kind this flavor targets.
    pub driver: String,
    pub created_at: u64,
}

impl Flavor {
    pub fn new(name: impl Into<String>, project_id: impl Into<String>, resources: Resources) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            project_id: project_id.into(),
            cpu: resources.cpu,
            memory_mb: resources.memory_mb,
            disk_gb: resources.disk_gb,
            python_version: "3".to_string(),
            driver: "tensorflow".to_string(),
            created_at: epoch_secs(),
        }
    }

    /// The resource request this flavor translates to.
    pub fn resources(&self) -> Resources {
        Resources::new(self.cpu, self.memory_mb, self.disk_gb)
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
