//! Capacity claims with commit/release semantics.
//!
//! A claim deducts the requested capacity from the host record the
//! moment it is granted, under the host's lock, so a concurrent claim
//! or inventory refresh can never observe the capacity as still free.
//! Committing keeps the deduction and tags the model with the host;
//! releasing (explicitly or by dropping an uncommitted claim) restores
//! the capacity exactly.
//!
//! The critical sections are all synchronous registry writes, so the
//! per-host locks are plain `std::sync::Mutex`es — never held across
//! an await point, and lockable from `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use mlgrid_core::Resources;
use mlgrid_registry::{HostStatus, Model, Registry};

use crate::error::{TrackerError, TrackerResult};

/// Keyed per-host capacity ledger.
#[derive(Clone)]
pub struct ClaimTable {
    registry: Registry,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ClaimTable {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The lock serializing all resource mutation for `hostname`.
    pub(crate) fn host_lock(&self, hostname: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("host lock table poisoned");
        locks
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reserve `requested` capacity on `hostname`.
    ///
    /// Fails with `ResourcesUnavailable` if the host is not Available
    /// or its free capacity is smaller than the request.
    pub fn claim(&self, hostname: &str, requested: Resources) -> TrackerResult<Claim> {
        let lock = self.host_lock(hostname);
        {
            let _guard = lock.lock().expect("host lock poisoned");
            let mut host = self.registry.get_host(hostname)?;
            if host.status != HostStatus::Available || !host.free().fits(&requested) {
                return Err(TrackerError::ResourcesUnavailable {
                    host: hostname.to_string(),
                });
            }
            host.used = host.used.add(&requested);
            self.registry.save_host(&host)?;
        }
        debug!(host = %hostname, cpu = requested.cpu, memory_mb = requested.memory_mb, "capacity claimed");
        Ok(Claim {
            registry: self.registry.clone(),
            lock,
            hostname: hostname.to_string(),
            requested,
            settled: false,
        })
    }

    /// Return previously committed capacity to a host (model
    /// undeployed, deleted, or failed after commit).
    pub fn refund(&self, hostname: &str, amount: Resources) -> TrackerResult<()> {
        let lock = self.host_lock(hostname);
        let _guard = lock.lock().expect("host lock poisoned");
        let mut host = self.registry.get_host(hostname)?;
        host.used = host.used.saturating_sub(&amount);
        self.registry.save_host(&host)?;
        debug!(host = %hostname, cpu = amount.cpu, memory_mb = amount.memory_mb, "capacity refunded");
        Ok(())
    }
}

/// A granted, not-yet-settled capacity reservation.
///
/// Dropping an uncommitted claim releases it, so every exit path out
/// of a provisioning transaction settles the reservation exactly once.
#[derive(Debug)]
pub struct Claim {
    registry: Registry,
    lock: Arc<Mutex<()>>,
    hostname: String,
    requested: Resources,
    settled: bool,
}

impl Claim {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn requested(&self) -> Resources {
        self.requested
    }

    /// Keep the deduction and tag the model as belonging to this host.
    ///
    /// The host tag is written under the host lock so the reservation
    /// cannot be lost to a concurrent inventory refresh.
    pub fn commit(mut self, model: &mut Model) -> TrackerResult<()> {
        {
            let _guard = self.lock.lock().expect("host lock poisoned");
            model.host = Some(self.hostname.clone());
            self.registry.save_model(model)?;
        }
        self.settled = true;
        info!(model = %model.id, host = %self.hostname, "claim committed");
        Ok(())
    }

    /// Give the capacity back explicitly.
    pub fn release(mut self) {
        self.settle_release();
    }

    fn settle_release(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        let _guard = self.lock.lock().expect("host lock poisoned");
        match self.registry.get_host(&self.hostname) {
            Ok(mut host) => {
                host.used = host.used.saturating_sub(&self.requested);
                if let Err(e) = self.registry.save_host(&host) {
                    error!(host = %self.hostname, error = %e, "failed to restore released capacity");
                } else {
                    debug!(host = %self.hostname, "claim released");
                }
            }
            Err(e) => {
                error!(host = %self.hostname, error = %e, "failed to load host for claim release");
            }
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.settle_release();
    }
}
