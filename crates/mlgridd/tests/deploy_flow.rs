//! End-to-end deployment flow over a file-backed registry: schedule,
//! provision, serve, and the capacity bookkeeping around it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use mlgrid_compute::drivers::noop::NoopDriver;
use mlgrid_compute::{ComputeApi, spawn_manager};
use mlgrid_core::Resources;
use mlgrid_core::config::DeployConfig;
use mlgrid_deploy::provisioner::default_template;
use mlgrid_deploy::{DeployError, Deployer, MockProvisioner};
use mlgrid_registry::{Flavor, Model, ModelStatus, Registry};
use mlgrid_scheduler::Scheduler;
use mlgrid_tracker::{ClaimTable, HostTracker};

const HOST: &str = "10.0.0.5";

struct Plane {
    registry: Registry,
    deployer: Deployer,
    provisioner: Arc<MockProvisioner>,
    _shutdown_tx: watch::Sender<bool>,
    _data_dir: tempfile::TempDir,
}

/// Assemble the control plane the way the daemon does, with a noop
/// driver standing in for the serving backend.
async fn control_plane() -> Plane {
    let data_dir = tempfile::tempdir().unwrap();
    let registry = Registry::open(&data_dir.path().join("mlgrid.redb")).unwrap();
    let claims = ClaimTable::new(registry.clone());
    let scheduler = Scheduler::new(registry.clone(), claims.clone());
    let compute = ComputeApi::new();

    let driver = Arc::new(NoopDriver::new(Resources::new(4, 8192, 100)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (manager_tx, _manager) = spawn_manager(HOST, driver.clone(), shutdown_rx);
    compute.register_host(HOST, manager_tx).await;

    // Eager inventory pass registers the host and reports capacity.
    let tracker = HostTracker::new(HOST, driver, registry.clone(), claims.clone());
    let host = tracker.update_available_resources().await.unwrap();
    assert_eq!(host.capacity, Resources::new(4, 8192, 100));

    let provisioner = Arc::new(MockProvisioner::new());
    let deployer = Deployer::new(
        registry.clone(),
        scheduler,
        claims,
        compute,
        provisioner.clone(),
        DeployConfig {
            poll_interval: 0,
            timeout: 5,
        },
        "TENSORFLOW",
        default_template(),
    );
    Plane {
        registry,
        deployer,
        provisioner,
        _shutdown_tx: shutdown_tx,
        _data_dir: data_dir,
    }
}

fn new_model(registry: &Registry, name: &str, cpu: u32, memory_mb: u64) -> Model {
    let flavor = Flavor::new(
        format!("{name}-flavor"),
        "project-1",
        Resources::new(cpu, memory_mb, 10),
    );
    registry.create_flavor(&flavor).unwrap();
    let mut model = Model::new(name, "project-1", "user-1");
    model.flavor_id = Some(flavor.id.clone());
    registry.create_model(&model).unwrap();
    model
}

async fn await_status(registry: &Registry, model_id: &str, status: ModelStatus) -> Model {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let model = registry.get_model(model_id).unwrap();
            if model.status == status {
                return model;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("model never reached {status}"))
}

#[tokio::test]
async fn deploy_serves_the_model_and_a_second_request_is_bounced() {
    let plane = control_plane().await;

    // First model fills most of the host.
    let first = new_model(&plane.registry, "mnist", 3, 6144);
    let started = plane.deployer.deploy(&first.id).await.unwrap();
    assert_eq!(started.status, ModelStatus::DeploymentStarted);
    assert_eq!(started.host.as_deref(), Some(HOST));

    plane.provisioner.complete("stack-0", HOST);
    let deployed = await_status(&plane.registry, &first.id, ModelStatus::Deployed).await;
    assert_eq!(deployed.deployed_on.as_deref(), Some(HOST));
    assert_eq!(
        deployed.url.as_deref(),
        Some("http://10.0.0.5:8501/v1/models/mnist:predict")
    );

    // Second model no longer fits; it lands in ERROR with a reason.
    let second = new_model(&plane.registry, "resnet", 2, 4096);
    match plane.deployer.deploy(&second.id).await {
        Err(DeployError::NoValidHost) => {}
        other => panic!("expected NoValidHost, got {other:?}"),
    }
    let bounced = plane.registry.get_model(&second.id).unwrap();
    assert_eq!(bounced.status, ModelStatus::Error);
    assert_eq!(
        bounced.status_reason.as_deref(),
        Some("There are not enough hosts available.")
    );

    // Undeploying the first frees enough room for a third.
    plane.deployer.undeploy(&first.id).await.unwrap();
    let third = new_model(&plane.registry, "bert", 2, 4096);
    let started = plane.deployer.deploy(&third.id).await.unwrap();
    assert_eq!(started.host.as_deref(), Some(HOST));

    plane.deployer.shutdown().await;
}

#[tokio::test]
async fn force_delete_during_provisioning_returns_the_capacity() {
    let plane = control_plane().await;
    let model = new_model(&plane.registry, "mnist", 2, 4096);

    plane.deployer.deploy(&model.id).await.unwrap();
    // The stack never converges; the deploy task is parked polling.
    assert_eq!(
        plane.registry.get_host(HOST).unwrap().free(),
        Resources::new(2, 4096, 90)
    );

    plane.deployer.delete(&model.id, true).await.unwrap();
    assert!(plane.registry.get_model(&model.id).is_err());
    assert_eq!(
        plane.registry.get_host(HOST).unwrap().free(),
        Resources::new(4, 8192, 100)
    );
}

#[tokio::test]
async fn restart_recovery_fails_interrupted_deploys() {
    let plane = control_plane().await;
    let model = new_model(&plane.registry, "mnist", 2, 4096);

    // Simulate a crash mid-deploy: committed capacity, no live task.
    let claims = ClaimTable::new(plane.registry.clone());
    let flavor = plane
        .registry
        .get_flavor(model.flavor_id.as_deref().unwrap())
        .unwrap();
    let mut record = plane.registry.get_model(&model.id).unwrap();
    record.set_status(ModelStatus::Scheduled, None);
    claims
        .claim(HOST, flavor.resources())
        .unwrap()
        .commit(&mut record)
        .unwrap();
    record.set_status(ModelStatus::DeploymentStarted, None);
    plane.registry.save_model(&record).unwrap();

    assert_eq!(plane.deployer.recover().await.unwrap(), 1);
    let after = plane.registry.get_model(&model.id).unwrap();
    assert_eq!(after.status, ModelStatus::DeploymentFailed);
    assert_eq!(
        plane.registry.get_host(HOST).unwrap().free(),
        Resources::new(4, 8192, 100)
    );

    // A failed model is not deployable until explicitly recreated.
    match plane.deployer.deploy(&model.id).await {
        Err(DeployError::InvalidState { .. }) => {}
        other => panic!("expected InvalidState, got {other:?}"),
    }
}
