//! The deployment state machine.
//!
//! `deploy` runs the synchronous head of the transaction — validate,
//! schedule, claim, commit — under the model's lock, then hands off to
//! a background task that polls the provisioner and the host registry
//! until the model is `Deployed` or the deadline passes. Every exit
//! path out of the asynchronous tail settles the committed capacity:
//! failure and timeout refund it, cancellation defers the refund to
//! the canceller, success keeps it until undeploy or delete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mlgrid_compute::ComputeApi;
use mlgrid_core::config::DeployConfig;
use mlgrid_core::{KeyedLocks, Resources};
use mlgrid_registry::{Model, ModelStatus, Registry};
use mlgrid_scheduler::{Scheduler, SchedulerError};
use mlgrid_tracker::ClaimTable;

use crate::error::{DeployError, DeployResult};
use crate::provisioner::{Provisioner, StackStatus};

const NO_VALID_HOST_REASON: &str = "There are not enough hosts available.";
const SERVING_PORT: u16 = 8501;

/// An in-flight deploy task and its cancellation handle.
struct DeploySlot {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct DeployerInner {
    registry: Registry,
    scheduler: Scheduler,
    claims: ClaimTable,
    compute: ComputeApi,
    provisioner: Arc<dyn Provisioner>,
    config: DeployConfig,
    stack_name: String,
    template: serde_json::Value,
    model_locks: KeyedLocks,
    tasks: AsyncMutex<HashMap<String, DeploySlot>>,
}

/// Drives models through their deployment lifecycle.
#[derive(Clone)]
pub struct Deployer {
    inner: Arc<DeployerInner>,
}

impl Deployer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Registry,
        scheduler: Scheduler,
        claims: ClaimTable,
        compute: ComputeApi,
        provisioner: Arc<dyn Provisioner>,
        config: DeployConfig,
        stack_name: impl Into<String>,
        template: serde_json::Value,
    ) -> Self {
        Self {
            inner: Arc::new(DeployerInner {
                registry,
                scheduler,
                claims,
                compute,
                provisioner,
                config,
                stack_name: stack_name.into(),
                template,
                model_locks: KeyedLocks::new(),
                tasks: AsyncMutex::new(HashMap::new()),
            }),
        }
    }

    /// Start deploying a model.
    ///
    /// Returns once the model is `DeploymentStarted` with committed
    /// capacity; provisioning continues in the background. A schedule
    /// miss moves the model to `Error` with a reason before the error
    /// is returned, so the record never sits in an intermediate state.
    pub async fn deploy(&self, model_id: &str) -> DeployResult<Model> {
        let inner = &self.inner;
        let _guard = inner.model_locks.lock(model_id).await;

        let mut model = inner.registry.get_model(model_id)?;
        if !model.status.deployable() {
            return Err(DeployError::InvalidState {
                model: model.id,
                status: model.status,
                action: "deploy",
            });
        }
        let flavor_id = model
            .flavor_id
            .clone()
            .ok_or_else(|| DeployError::MissingFlavor(model.id.clone()))?;
        let flavor = inner.registry.get_flavor(&flavor_id)?;
        let requested = flavor.resources();

        // A Scheduled record re-entering deploy still holds its earlier
        // commitment; give that back before claiming afresh, or the
        // host's used capacity inflates by one flavor per retry.
        if model.host.is_some() {
            refund_committed(inner, &model)?;
            model.host = None;
            inner.registry.save_model(&model)?;
        }

        let claim = match inner.scheduler.schedule(&model, requested) {
            Ok(claim) => claim,
            Err(SchedulerError::NoValidHost) => {
                warn!(model = %model.id, "no valid host");
                model.set_status(ModelStatus::Error, Some(NO_VALID_HOST_REASON));
                inner.registry.save_model(&model)?;
                return Err(DeployError::NoValidHost);
            }
            Err(e) => return Err(e.into()),
        };

        model.set_status(ModelStatus::Scheduled, None);
        claim.commit(&mut model)?;
        model.set_status(ModelStatus::DeploymentStarted, None);
        inner.registry.save_model(&model)?;
        info!(model = %model.id, host = ?model.host, "deployment started");

        let mut parameters = HashMap::new();
        parameters.insert("flavor".to_string(), flavor.name.clone());
        parameters.insert("model_id".to_string(), model.id.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_inner = inner.clone();
        let task_model_id = model.id.clone();
        // The slot goes into the map under the same lock acquisition
        // that outlives the spawn, so the task's own removal on
        // completion cannot run before the insert.
        let mut tasks = inner.tasks.lock().await;
        let handle = tokio::spawn(async move {
            run_deploy_task(task_inner, task_model_id, requested, parameters, shutdown_rx).await;
        });
        tasks.insert(
            model.id.clone(),
            DeploySlot {
                shutdown_tx,
                handle,
            },
        );
        drop(tasks);
        Ok(model)
    }

    /// Stop serving a deployed model and return its capacity.
    pub async fn undeploy(&self, model_id: &str) -> DeployResult<Model> {
        let inner = &self.inner;
        let _guard = inner.model_locks.lock(model_id).await;

        let mut model = inner.registry.get_model(model_id)?;
        if !model.status.undeployable() {
            return Err(DeployError::InvalidState {
                model: model.id,
                status: model.status,
                action: "undeploy",
            });
        }

        // Tell the host to stop serving while the record still carries
        // the assignment.
        if let Err(e) = inner.compute.model_undeploy(&model).await {
            warn!(model = %model.id, error = %e, "compute undeploy cast failed");
        }
        refund_committed(inner, &model)?;

        model.url = None;
        model.deployed_on = None;
        model.set_status(ModelStatus::Undeployed, None);
        inner.registry.save_model(&model)?;
        info!(model = %model.id, "model undeployed");
        Ok(model)
    }

    /// Remove a model entirely.
    ///
    /// A plain delete is refused while a deploy is in flight; `force`
    /// cancels the background task first, then tears everything down.
    pub async fn delete(&self, model_id: &str, force: bool) -> DeployResult<()> {
        let inner = &self.inner;
        // Cancel before taking the model lock: a task settling its own
        // failure needs that lock to finish stopping.
        if force {
            self.cancel_task(model_id).await;
        }
        let _guard = inner.model_locks.lock(model_id).await;

        let model = inner.registry.get_model(model_id)?;
        if model.status.mid_deployment() && !force {
            return Err(DeployError::InvalidState {
                model: model.id,
                status: model.status,
                action: "delete",
            });
        }

        if model.status.holds_capacity() {
            refund_committed(inner, &model)?;
        }
        if model.host.is_some() {
            if let Err(e) = inner.compute.model_delete(&model, force).await {
                warn!(model = %model.id, error = %e, "compute delete cast failed");
            }
        }
        inner.registry.delete_model(model_id)?;
        inner.model_locks.forget(model_id);
        info!(model = %model.id, force, "model deleted");
        Ok(())
    }

    /// Settle models left mid-deployment by a previous process.
    ///
    /// Their background tasks are gone, so the only safe move is to
    /// refund the committed capacity and mark them failed; the owner
    /// can redeploy.
    pub async fn recover(&self) -> DeployResult<usize> {
        let inner = &self.inner;
        let mut recovered = 0;
        for mut model in inner.registry.list_models()? {
            if !model.status.mid_deployment() {
                continue;
            }
            let _guard = inner.model_locks.lock(&model.id).await;
            refund_committed(inner, &model)?;
            model.set_status(
                ModelStatus::DeploymentFailed,
                Some("deploy interrupted by restart"),
            );
            inner.registry.save_model(&model)?;
            warn!(model = %model.id, "interrupted deploy marked failed");
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Cancel every in-flight deploy task and wait for them to stop.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, DeploySlot)> =
            self.inner.tasks.lock().await.drain().collect();
        for (model_id, slot) in slots {
            let _ = slot.shutdown_tx.send(true);
            if let Err(e) = slot.handle.await {
                error!(model = %model_id, error = %e, "deploy task panicked");
            }
        }
    }

    #[cfg(test)]
    async fn task_count(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    async fn cancel_task(&self, model_id: &str) {
        let slot = self.inner.tasks.lock().await.remove(model_id);
        if let Some(slot) = slot {
            let _ = slot.shutdown_tx.send(true);
            if let Err(e) = slot.handle.await {
                error!(model = %model_id, error = %e, "deploy task panicked");
            }
            debug!(model = %model_id, "deploy task cancelled");
        }
    }
}

/// Return the model's committed capacity to its host, if any.
fn refund_committed(inner: &DeployerInner, model: &Model) -> DeployResult<()> {
    let Some(host) = model.host.as_deref() else {
        return Ok(());
    };
    let Some(flavor_id) = model.flavor_id.as_deref() else {
        return Ok(());
    };
    let flavor = inner.registry.get_flavor(flavor_id)?;
    inner.claims.refund(host, flavor.resources())?;
    Ok(())
}

/// The asynchronous tail of a deploy: provision, wait for the node,
/// wait for it to report in, then mark the model served.
async fn run_deploy_task(
    inner: Arc<DeployerInner>,
    model_id: String,
    requested: Resources,
    parameters: HashMap<String, String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let deadline = Instant::now() + inner.config.timeout();

    let outcome = drive_deploy(&inner, &model_id, parameters, deadline, &mut shutdown_rx).await;
    match outcome {
        Outcome::Deployed => {}
        Outcome::Cancelled => {
            // The canceller owns cleanup once the task has stopped.
            debug!(model = %model_id, "deploy task stopped on cancel");
            return;
        }
        Outcome::Failed(reason) => {
            fail_deploy(&inner, &model_id, requested, &reason).await;
        }
    }
    inner.tasks.lock().await.remove(&model_id);
}

enum Outcome {
    Deployed,
    Failed(String),
    Cancelled,
}

async fn drive_deploy(
    inner: &Arc<DeployerInner>,
    model_id: &str,
    parameters: HashMap<String, String>,
    deadline: Instant,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Outcome {
    let stack_id = match inner
        .provisioner
        .create_stack(&inner.stack_name, inner.template.clone(), parameters)
        .await
    {
        Ok(id) => id,
        Err(e) => return Outcome::Failed(format!("stack creation failed: {e}")),
    };
    debug!(model = %model_id, stack = %stack_id, "stack creation requested");

    // Phase 1: wait for the stack to converge.
    let address = loop {
        if Instant::now() >= deadline {
            return Outcome::Failed("deploy timed out waiting for the stack".to_string());
        }
        match inner.provisioner.get_stack(&stack_id).await {
            Ok(stack) => match stack.status {
                StackStatus::Complete => match stack.public_address() {
                    Some(address) => break address.to_string(),
                    None => {
                        return Outcome::Failed(
                            "stack completed without a public address".to_string(),
                        );
                    }
                },
                StackStatus::Failed => {
                    let reason = stack
                        .status_reason
                        .unwrap_or_else(|| "stack creation failed".to_string());
                    return Outcome::Failed(reason);
                }
                StackStatus::InProgress => {}
            },
            // Transient API errors are retried until the deadline.
            Err(e) => warn!(model = %model_id, stack = %stack_id, error = %e, "stack poll failed"),
        }
        if wait_or_cancel(inner.config.poll_interval(), shutdown_rx).await {
            return Outcome::Cancelled;
        }
    };

    let mut model = match inner.registry.get_model(model_id) {
        Ok(model) => model,
        Err(e) => return Outcome::Failed(format!("registry read failed: {e}")),
    };
    model.deployed_on = Some(address.clone());
    model.set_status(ModelStatus::DeployedComputeNode, None);
    if let Err(e) = inner.registry.save_model(&model) {
        return Outcome::Failed(format!("registry write failed: {e}"));
    }
    info!(model = %model_id, %address, "compute node provisioned");

    // Phase 2: wait for the node's compute service to register itself.
    loop {
        if Instant::now() >= deadline {
            return Outcome::Failed(format!(
                "deploy timed out waiting for host {address} to register"
            ));
        }
        match inner.registry.get_host(&address) {
            Ok(_) => break,
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(model = %model_id, error = %e, "host registry poll failed"),
        }
        if wait_or_cancel(inner.config.poll_interval(), shutdown_rx).await {
            return Outcome::Cancelled;
        }
    }

    model.url = Some(format!(
        "http://{address}:{SERVING_PORT}/v1/models/{}:predict",
        model.name
    ));
    model.model_data = None;
    model.set_status(ModelStatus::Deployed, None);
    if let Err(e) = inner.registry.save_model(&model) {
        return Outcome::Failed(format!("registry write failed: {e}"));
    }
    info!(model = %model_id, url = ?model.url, "model deployed");

    // Best effort: the node will also pick the model up from the
    // registry if the cast does not reach it.
    if let Err(e) = inner.compute.model_create(&address, &model).await {
        warn!(model = %model_id, %address, error = %e, "compute create cast failed");
    }
    Outcome::Deployed
}

/// Sleep for `interval`, returning `true` if shutdown was signalled.
async fn wait_or_cancel(
    interval: std::time::Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = shutdown_rx.changed() => true,
    }
}

async fn fail_deploy(inner: &DeployerInner, model_id: &str, requested: Resources, reason: &str) {
    error!(model = %model_id, %reason, "deploy failed");
    let _guard = inner.model_locks.lock(model_id).await;
    let mut model = match inner.registry.get_model(model_id) {
        Ok(model) => model,
        Err(e) => {
            // Deleted out from under the task; nothing left to settle.
            warn!(model = %model_id, error = %e, "failed deploy has no record");
            return;
        }
    };
    if let Some(host) = model.host.as_deref() {
        if let Err(e) = inner.claims.refund(host, requested) {
            error!(model = %model_id, %host, error = %e, "refund after failed deploy failed");
        }
    }
    model.set_status(ModelStatus::DeploymentFailed, Some(reason));
    if let Err(e) = inner.registry.save_model(&model) {
        error!(model = %model_id, error = %e, "failed to persist deploy failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvisioner;
    use mlgrid_compute::drivers::noop::NoopDriver;
    use mlgrid_compute::manager::spawn_manager;
    use mlgrid_registry::{ComputeHost, Flavor};
    use std::time::Duration;

    const HOST: &str = "10.0.0.5";

    struct Harness {
        registry: Registry,
        deployer: Deployer,
        provisioner: Arc<MockProvisioner>,
        driver: Arc<NoopDriver>,
        _shutdown_tx: watch::Sender<bool>,
    }

    async fn harness() -> Harness {
        let registry = Registry::open_in_memory().unwrap();
        let claims = ClaimTable::new(registry.clone());
        let scheduler = Scheduler::new(registry.clone(), claims.clone());
        let compute = ComputeApi::new();
        let provisioner = Arc::new(MockProvisioner::new());

        let driver = Arc::new(NoopDriver::new(Resources::new(4, 8192, 100)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, _handle) = spawn_manager(HOST, driver.clone(), shutdown_rx);
        compute.register_host(HOST, tx).await;

        let mut host = ComputeHost::new(HOST, "noop");
        host.capacity = Resources::new(4, 8192, 100);
        registry.create_host(&host).unwrap();

        let config = DeployConfig {
            poll_interval: 0,
            timeout: 5,
        };
        let deployer = Deployer::new(
            registry.clone(),
            scheduler,
            claims,
            compute,
            provisioner.clone(),
            config,
            "TENSORFLOW",
            crate::provisioner::default_template(),
        );
        Harness {
            registry,
            deployer,
            provisioner,
            driver,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn model_with_flavor(registry: &Registry, cpu: u32, memory_mb: u64) -> Model {
        let flavor = Flavor::new("standard", "project-1", Resources::new(cpu, memory_mb, 10));
        registry.create_flavor(&flavor).unwrap();
        let mut model = Model::new("mnist", "project-1", "user-1");
        model.flavor_id = Some(flavor.id.clone());
        model.model_data = Some(b"weights".to_vec());
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

    fn free(registry: &Registry) -> Resources {
        registry.get_host(HOST).unwrap().free()
    }

    #[tokio::test]
    async fn deploy_reaches_deployed_and_sets_url() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);

        let started = h.deployer.deploy(&model.id).await.unwrap();
        assert_eq!(started.status, ModelStatus::DeploymentStarted);
        assert_eq!(started.host.as_deref(), Some(HOST));

        h.provisioner.complete("stack-0", HOST);
        let deployed = await_status(&h.registry, &model.id, ModelStatus::Deployed).await;

        assert_eq!(deployed.deployed_on.as_deref(), Some(HOST));
        assert_eq!(
            deployed.url.as_deref(),
            Some("http://10.0.0.5:8501/v1/models/mnist:predict")
        );
        assert_eq!(deployed.model_data, None);
        assert_eq!(free(&h.registry), Resources::new(2, 4096, 90));

        // Manager received the serve cast.
        h.deployer.shutdown().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = h.driver.calls();
        assert!(calls.iter().any(|c| c == &format!("create {}", model.id)));
    }

    #[tokio::test]
    async fn stack_failure_refunds_and_marks_failed() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);
        let before = free(&h.registry);

        h.deployer.deploy(&model.id).await.unwrap();
        h.provisioner.fail("stack-0", "quota exceeded");

        let failed = await_status(&h.registry, &model.id, ModelStatus::DeploymentFailed).await;
        assert_eq!(failed.status_reason.as_deref(), Some("quota exceeded"));
        assert_eq!(failed.host, None);
        assert_eq!(free(&h.registry), before);
    }

    #[tokio::test]
    async fn redeploy_from_scheduled_returns_the_old_commitment() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);

        // Persist a committed Scheduled record, as an earlier deploy
        // attempt would have left it.
        let flavor = h
            .registry
            .get_flavor(model.flavor_id.as_deref().unwrap())
            .unwrap();
        let claims = ClaimTable::new(h.registry.clone());
        let mut record = h.registry.get_model(&model.id).unwrap();
        record.set_status(ModelStatus::Scheduled, None);
        claims
            .claim(HOST, flavor.resources())
            .unwrap()
            .commit(&mut record)
            .unwrap();
        assert_eq!(free(&h.registry), Resources::new(2, 4096, 90));

        let started = h.deployer.deploy(&model.id).await.unwrap();
        assert_eq!(started.host.as_deref(), Some(HOST));
        h.provisioner.complete("stack-0", HOST);
        await_status(&h.registry, &model.id, ModelStatus::Deployed).await;

        // Exactly one flavor's worth is held, not two.
        assert_eq!(free(&h.registry), Resources::new(2, 4096, 90));

        h.deployer.undeploy(&model.id).await.unwrap();
        assert_eq!(free(&h.registry), Resources::new(4, 8192, 100));
    }

    #[tokio::test]
    async fn finished_tasks_leave_the_slot_map() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);

        h.deployer.deploy(&model.id).await.unwrap();
        assert_eq!(h.deployer.task_count().await, 1);

        h.provisioner.complete("stack-0", HOST);
        await_status(&h.registry, &model.id, ModelStatus::Deployed).await;

        // The task removes its own slot once it settles.
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.deployer.task_count().await != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("completed deploy task left its slot behind");
    }

    #[tokio::test]
    async fn stuck_provisioner_times_out_into_failed() {
        let h = harness().await;
        // Zero timeout: the deadline has passed by the first poll.
        let claims = ClaimTable::new(h.registry.clone());
        let deployer = Deployer::new(
            h.registry.clone(),
            Scheduler::new(h.registry.clone(), claims.clone()),
            claims,
            ComputeApi::new(),
            h.provisioner.clone(),
            DeployConfig {
                poll_interval: 0,
                timeout: 0,
            },
            "TENSORFLOW",
            crate::provisioner::default_template(),
        );
        let model = model_with_flavor(&h.registry, 2, 4096);
        let before = free(&h.registry);

        deployer.deploy(&model.id).await.unwrap();
        // Stack stays InProgress; only the deadline can end the task.
        let failed = await_status(&h.registry, &model.id, ModelStatus::DeploymentFailed).await;
        assert!(
            failed
                .status_reason
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
        assert_eq!(free(&h.registry), before);
    }

    #[tokio::test]
    async fn deploy_from_invalid_state_is_rejected() {
        let h = harness().await;
        let mut model = model_with_flavor(&h.registry, 2, 4096);
        model.set_status(ModelStatus::Deployed, None);
        h.registry.save_model(&model).unwrap();

        match h.deployer.deploy(&model.id).await {
            Err(DeployError::InvalidState { status, .. }) => {
                assert_eq!(status, ModelStatus::Deployed)
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        // The record is untouched.
        let after = h.registry.get_model(&model.id).unwrap();
        assert_eq!(after.status, ModelStatus::Deployed);
    }

    #[tokio::test]
    async fn schedule_miss_marks_error_with_reason() {
        let h = harness().await;
        // Request more than the host can ever hold.
        let model = model_with_flavor(&h.registry, 32, 262144);

        match h.deployer.deploy(&model.id).await {
            Err(DeployError::NoValidHost) => {}
            other => panic!("expected NoValidHost, got {other:?}"),
        }
        let after = h.registry.get_model(&model.id).unwrap();
        assert_eq!(after.status, ModelStatus::Error);
        assert_eq!(
            after.status_reason.as_deref(),
            Some("There are not enough hosts available.")
        );
        assert_eq!(after.host, None);
    }

    #[tokio::test]
    async fn undeploy_restores_capacity_and_clears_serving_fields() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);
        let before = free(&h.registry);

        h.deployer.deploy(&model.id).await.unwrap();
        h.provisioner.complete("stack-0", HOST);
        await_status(&h.registry, &model.id, ModelStatus::Deployed).await;

        let undeployed = h.deployer.undeploy(&model.id).await.unwrap();
        assert_eq!(undeployed.status, ModelStatus::Undeployed);
        assert_eq!(undeployed.url, None);
        assert_eq!(undeployed.deployed_on, None);
        assert_eq!(undeployed.host, None);
        assert_eq!(free(&h.registry), before);

        // Undeployed models may be deployed again.
        h.deployer.deploy(&model.id).await.unwrap();
    }

    #[tokio::test]
    async fn undeploy_of_undeployed_model_is_rejected() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);
        match h.deployer.undeploy(&model.id).await {
            Err(DeployError::InvalidState { action, .. }) => assert_eq!(action, "undeploy"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_delete_is_refused_mid_deployment() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);
        h.deployer.deploy(&model.id).await.unwrap();

        match h.deployer.delete(&model.id, false).await {
            Err(DeployError::InvalidState { action, .. }) => assert_eq!(action, "delete"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        h.deployer.shutdown().await;
    }

    #[tokio::test]
    async fn force_delete_cancels_the_inflight_task() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);
        let before = free(&h.registry);

        h.deployer.deploy(&model.id).await.unwrap();
        // Stack never converges; the task is parked in the poll loop.
        h.deployer.delete(&model.id, true).await.unwrap();

        assert!(h.registry.get_model(&model.id).is_err());
        assert_eq!(free(&h.registry), before);
    }

    #[tokio::test]
    async fn recover_settles_interrupted_deploys() {
        let h = harness().await;
        let model = model_with_flavor(&h.registry, 2, 4096);

        // Simulate a crash after commit: capacity held, no task alive.
        let flavor = h
            .registry
            .get_flavor(model.flavor_id.as_deref().unwrap())
            .unwrap();
        let claims = ClaimTable::new(h.registry.clone());
        let mut record = h.registry.get_model(&model.id).unwrap();
        record.set_status(ModelStatus::Scheduled, None);
        claims
            .claim(HOST, flavor.resources())
            .unwrap()
            .commit(&mut record)
            .unwrap();
        record.set_status(ModelStatus::DeploymentStarted, None);
        h.registry.save_model(&record).unwrap();
        let before = Resources::new(4, 8192, 100);
        assert_ne!(free(&h.registry), before);

        let recovered = h.deployer.recover().await.unwrap();
        assert_eq!(recovered, 1);
        let after = h.registry.get_model(&model.id).unwrap();
        assert_eq!(after.status, ModelStatus::DeploymentFailed);
        assert_eq!(
            after.status_reason.as_deref(),
            Some("deploy interrupted by restart")
        );
        assert_eq!(free(&h.registry), before);
    }
}
