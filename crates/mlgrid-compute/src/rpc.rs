//! ComputeApi — client side of the compute RPC layer.
//!
//! Routes model lifecycle calls to the manager of the model's recorded
//! host. Casts (`model_create`, `model_delete`, `model_undeploy`) are
//! fire-and-forget; calls (`model_show`, `model_update`,
//! `model_predict`) wait on a oneshot reply.
//!
//! A model with no assigned host is a state-machine invariant
//! violation (`HostNotAssigned`); an unregistered or closed manager
//! channel is the distinguished `HostNotUp` condition that user-facing
//! layers translate into "server not usable".

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::debug;

use mlgrid_registry::Model;

use crate::error::{ComputeError, ComputeResult};
use crate::manager::{Command, ModelPatch};

/// Message-passing façade between the scheduling side and per-host
/// manager tasks.
#[derive(Clone, Default)]
pub struct ComputeApi {
    routes: Arc<RwLock<HashMap<String, mpsc::Sender<Command>>>>,
}

impl ComputeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the command channel for a host's manager.
    pub async fn register_host(&self, hostname: &str, sender: mpsc::Sender<Command>) {
        let mut routes = self.routes.write().await;
        routes.insert(hostname.to_string(), sender);
        debug!(host = %hostname, "compute route registered");
    }

    /// Remove a host's route (manager stopped).
    pub async fn deregister_host(&self, hostname: &str) {
        let mut routes = self.routes.write().await;
        routes.remove(hostname);
        debug!(host = %hostname, "compute route removed");
    }

    async fn route(&self, host: &str) -> ComputeResult<mpsc::Sender<Command>> {
        let routes = self.routes.read().await;
        routes
            .get(host)
            .cloned()
            .ok_or_else(|| ComputeError::HostNotUp(host.to_string()))
    }

    fn assigned_host(model: &Model) -> ComputeResult<&str> {
        model
            .host
            .as_deref()
            .ok_or_else(|| ComputeError::HostNotAssigned(model.id.clone()))
    }

    async fn cast(&self, host: &str, command: Command) -> ComputeResult<()> {
        let sender = self.route(host).await?;
        sender
            .send(command)
            .await
            .map_err(|_| ComputeError::HostNotUp(host.to_string()))
    }

    async fn call<T>(
        &self,
        host: &str,
        command: Command,
        reply: oneshot::Receiver<ComputeResult<T>>,
    ) -> ComputeResult<T> {
        let sender = self.route(host).await?;
        sender
            .send(command)
            .await
            .map_err(|_| ComputeError::HostNotUp(host.to_string()))?;
        reply
            .await
            .map_err(|_| ComputeError::HostNotUp(host.to_string()))?
    }

    /// Dispatch a model to a host (explicit target — used right after
    /// deployment, before callers re-read the record).
    pub async fn model_create(&self, host: &str, model: &Model) -> ComputeResult<()> {
        self.cast(
            host,
            Command::Create {
                model: Box::new(model.clone()),
            },
        )
        .await
    }

    /// Tear a model down on its assigned host.
    pub async fn model_delete(&self, model: &Model, force: bool) -> ComputeResult<()> {
        let host = Self::assigned_host(model)?;
        self.cast(
            host,
            Command::Delete {
                model_id: model.id.clone(),
                force,
            },
        )
        .await
    }

    /// Stop serving a model on its assigned host.
    pub async fn model_undeploy(&self, model: &Model) -> ComputeResult<()> {
        let host = Self::assigned_host(model)?;
        self.cast(
            host,
            Command::Undeploy {
                model_id: model.id.clone(),
            },
        )
        .await
    }

    /// Live state of the model as its host sees it.
    pub async fn model_show(&self, model: &Model) -> ComputeResult<Model> {
        let host = Self::assigned_host(model)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.call(
            host,
            Command::Show {
                model_id: model.id.clone(),
                reply: reply_tx,
            },
            reply_rx,
        )
        .await
    }

    /// Patch the model on its assigned host, returning the result.
    pub async fn model_update(&self, model: &Model, patch: ModelPatch) -> ComputeResult<Model> {
        let host = Self::assigned_host(model)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.call(
            host,
            Command::Update {
                model_id: model.id.clone(),
                patch,
                reply: reply_tx,
            },
            reply_rx,
        )
        .await
    }

    /// Run inference. The payload and the prediction cross the façade
    /// boundary base64-encoded.
    pub async fn model_predict(&self, model: &Model, payload_b64: &str) -> ComputeResult<String> {
        let host = Self::assigned_host(model)?;
        let payload = BASE64
            .decode(payload_b64)
            .map_err(|e| ComputeError::InvalidPayload(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let prediction = self
            .call(
                host,
                Command::Predict {
                    model_id: model.id.clone(),
                    payload,
                    reply: reply_tx,
                },
                reply_rx,
            )
            .await?;
        Ok(BASE64.encode(prediction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::noop::NoopDriver;
    use crate::manager::spawn_manager;
    use mlgrid_core::Resources;
    use mlgrid_registry::{Model, ModelStatus};
    use tokio::sync::watch;

    fn deployed_model(host: &str) -> Model {
        let mut model = Model::new("mnist", "project-1", "user-1");
        model.set_status(ModelStatus::Deployed, None);
        model.host = Some(host.to_string());
        model
    }

    #[tokio::test]
    async fn routes_by_assigned_host() {
        let api = ComputeApi::new();
        let driver = Arc::new(NoopDriver::new(Resources::new(2, 4096, 10)));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, _handle) = spawn_manager("10.0.0.5", driver, shutdown_rx);
        api.register_host("10.0.0.5", tx).await;

        let model = deployed_model("10.0.0.5");
        api.model_create("10.0.0.5", &model).await.unwrap();

        let payload = BASE64.encode(b"input");
        let prediction = api.model_predict(&model, &payload).await.unwrap();
        assert_eq!(BASE64.decode(prediction).unwrap(), b"input");
    }

    #[tokio::test]
    async fn unassigned_model_is_invariant_violation() {
        let api = ComputeApi::new();
        let model = Model::new("mnist", "project-1", "user-1");
        match api.model_show(&model).await {
            Err(ComputeError::HostNotAssigned(id)) => assert_eq!(id, model.id),
            other => panic!("expected HostNotAssigned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_host_is_host_not_up() {
        let api = ComputeApi::new();
        let model = deployed_model("10.0.0.99");
        match api.model_show(&model).await {
            Err(ComputeError::HostNotUp(host)) => assert_eq!(host, "10.0.0.99"),
            other => panic!("expected HostNotUp, got {other:?}"),
        }
    }
}
