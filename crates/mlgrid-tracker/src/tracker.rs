//! HostTracker — per-host inventory refresh and registration.

use std::sync::Arc;

use tracing::{info, warn};

use mlgrid_compute::ModelDriver;
use mlgrid_registry::{ComputeHost, Registry, epoch_secs};

use crate::claim::ClaimTable;
use crate::error::TrackerResult;

/// Per-host singleton that reports and refreshes the host's resource
/// inventory. Runs once eagerly at startup and then on the periodic
/// inventory timer.
pub struct HostTracker {
    hostname: String,
    driver: Arc<dyn ModelDriver>,
    registry: Registry,
    claims: ClaimTable,
}

impl HostTracker {
    pub fn new(
        hostname: impl Into<String>,
        driver: Arc<dyn ModelDriver>,
        registry: Registry,
        claims: ClaimTable,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            driver,
            registry,
            claims,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Refresh this host's record from the driver's inventory report.
    ///
    /// Registers the host on first contact. If the driver cannot
    /// report resources the previous snapshot is kept — a failed
    /// inventory pass is not fatal to host availability.
    pub async fn update_available_resources(&self) -> TrackerResult<ComputeHost> {
        // The driver call suspends, so it happens before taking the
        // host lock; only the record merge is serialized.
        let reported = match self.driver.get_available_resources(&self.hostname).await {
            Ok(resources) => Some(resources),
            Err(e) => {
                warn!(host = %self.hostname, error = %e, "inventory report failed, keeping previous snapshot");
                None
            }
        };

        let lock = self.claims.host_lock(&self.hostname);
        let _guard = lock.lock().expect("host lock poisoned");

        let mut host = match self.registry.get_host(&self.hostname) {
            Ok(host) => host,
            Err(e) if e.is_not_found() => {
                let host = ComputeHost::new(&self.hostname, self.driver.kind().to_string());
                self.registry.create_host(&host)?;
                info!(host = %self.hostname, driver = %host.driver, "host registered");
                host
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(capacity) = reported {
            host.capacity = capacity;
            host.last_inventory = epoch_secs();
            self.registry.save_host(&host)?;
        }
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mlgrid_compute::drivers::noop::NoopDriver;
    use mlgrid_compute::{ComputeError, ComputeResult, DriverKind};
    use mlgrid_core::Resources;
    use mlgrid_registry::Model;

    /// Driver whose inventory reporting always fails.
    struct BrokenInventoryDriver;

    #[async_trait]
    impl ModelDriver for BrokenInventoryDriver {
        fn kind(&self) -> DriverKind {
            DriverKind::Noop
        }
        async fn create(&self, _model: &Model) -> ComputeResult<()> {
            Ok(())
        }
        async fn delete(&self, _model_id: &str, _force: bool) -> ComputeResult<()> {
            Ok(())
        }
        async fn show(&self, model_id: &str) -> ComputeResult<Model> {
            Err(ComputeError::ModelNotRunning(model_id.to_string()))
        }
        async fn train(&self, _model: &Model) -> ComputeResult<()> {
            Ok(())
        }
        async fn deploy(&self, _model_id: &str) -> ComputeResult<()> {
            Ok(())
        }
        async fn undeploy(&self, _model_id: &str) -> ComputeResult<()> {
            Ok(())
        }
        async fn predict(&self, _model_id: &str, _payload: &[u8]) -> ComputeResult<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn get_available_resources(&self, host: &str) -> ComputeResult<Resources> {
            Err(ComputeError::Driver(format!("no inventory for {host}")))
        }
    }

    #[tokio::test]
    async fn registers_host_on_first_contact() {
        let registry = Registry::open_in_memory().unwrap();
        let claims = ClaimTable::new(registry.clone());
        let driver = Arc::new(NoopDriver::new(Resources::new(4, 8192, 100)));
        let tracker = HostTracker::new("compute-1", driver, registry.clone(), claims);

        let host = tracker.update_available_resources().await.unwrap();
        assert_eq!(host.hostname, "compute-1");
        assert_eq!(host.capacity, Resources::new(4, 8192, 100));
        assert_eq!(registry.list_hosts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inventory_failure_keeps_previous_snapshot() {
        let registry = Registry::open_in_memory().unwrap();
        let claims = ClaimTable::new(registry.clone());

        // Seed a good snapshot first.
        let good = Arc::new(NoopDriver::new(Resources::new(4, 8192, 100)));
        HostTracker::new("compute-1", good, registry.clone(), claims.clone())
            .update_available_resources()
            .await
            .unwrap();

        let broken = HostTracker::new(
            "compute-1",
            Arc::new(BrokenInventoryDriver),
            registry.clone(),
            claims,
        );
        let host = broken.update_available_resources().await.unwrap();
        assert_eq!(host.capacity, Resources::new(4, 8192, 100));
    }

    #[tokio::test]
    async fn refresh_does_not_clobber_claimed_usage() {
        let registry = Registry::open_in_memory().unwrap();
        let claims = ClaimTable::new(registry.clone());
        let driver = Arc::new(NoopDriver::new(Resources::new(4, 8192, 100)));
        let tracker = HostTracker::new("compute-1", driver, registry.clone(), claims.clone());
        tracker.update_available_resources().await.unwrap();

        let _claim = claims.claim("compute-1", Resources::new(2, 4096, 0)).unwrap();
        let host = tracker.update_available_resources().await.unwrap();
        assert_eq!(host.free(), Resources::new(2, 4096, 100));
    }
}
