//! ComputeManager — the per-host task that runs models.
//!
//! One manager task exists per compute host. It owns the host's
//! `ModelDriver` and reacts to commands arriving over an mpsc channel:
//! fire-and-forget casts (create, delete) and request/response calls
//! (show, update, predict) carrying a oneshot reply sender.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use mlgrid_registry::Model;

use crate::driver::ModelDriver;
use crate::error::{ComputeError, ComputeResult};

/// Partial update applied to a running model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPatch {
    pub name: Option<String>,
    pub hints: Option<HashMap<String, String>>,
}

/// Commands dispatched to a host's manager task.
#[derive(Debug)]
pub enum Command {
    /// Materialize and start serving a model (cast).
    Create { model: Box<Model> },
    /// Remove a model from this host (cast).
    Delete { model_id: String, force: bool },
    /// Stop serving a model without removing it (cast).
    Undeploy { model_id: String },
    /// Live state of a model (call).
    Show {
        model_id: String,
        reply: oneshot::Sender<ComputeResult<Model>>,
    },
    /// Patch a running model (call).
    Update {
        model_id: String,
        patch: ModelPatch,
        reply: oneshot::Sender<ComputeResult<Model>>,
    },
    /// Run inference (call).
    Predict {
        model_id: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<ComputeResult<Vec<u8>>>,
    },
}

/// Manages the models running on one compute host.
pub struct ComputeManager {
    hostname: String,
    driver: Arc<dyn ModelDriver>,
}

impl ComputeManager {
    pub fn new(hostname: impl Into<String>, driver: Arc<dyn ModelDriver>) -> Self {
        Self {
            hostname: hostname.into(),
            driver,
        }
    }

    pub fn driver(&self) -> Arc<dyn ModelDriver> {
        self.driver.clone()
    }

    /// Run the command loop until the channel closes or shutdown fires.
    pub async fn run(self, mut rx: mpsc::Receiver<Command>, mut shutdown: watch::Receiver<bool>) {
        info!(host = %self.hostname, driver = %self.driver.kind(), "compute manager started");
        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    debug!(host = %self.hostname, "compute manager shutting down");
                    break;
                }
            }
        }
        info!(host = %self.hostname, "compute manager stopped");
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::Create { model } => {
                // Cast: failures are logged, not reported back.
                if let Err(e) = self.do_create(&model).await {
                    error!(host = %self.hostname, model = %model.id, error = %e, "model create failed");
                }
            }
            Command::Delete { model_id, force } => {
                if let Err(e) = self.driver.delete(&model_id, force).await {
                    if force {
                        warn!(host = %self.hostname, model = %model_id, error = %e, "forced teardown incomplete");
                    } else {
                        error!(host = %self.hostname, model = %model_id, error = %e, "model delete failed");
                    }
                }
            }
            Command::Undeploy { model_id } => {
                if let Err(e) = self.driver.undeploy(&model_id).await {
                    warn!(host = %self.hostname, model = %model_id, error = %e, "model undeploy failed");
                }
            }
            Command::Show { model_id, reply } => {
                let _ = reply.send(self.driver.show(&model_id).await);
            }
            Command::Update {
                model_id,
                patch,
                reply,
            } => {
                let _ = reply.send(self.do_update(&model_id, patch).await);
            }
            Command::Predict {
                model_id,
                payload,
                reply,
            } => {
                let _ = reply.send(self.driver.predict(&model_id, &payload).await);
            }
        }
    }

    async fn do_create(&self, model: &Model) -> ComputeResult<()> {
        self.driver.create(model).await?;
        // A model only reaches this host once the state machine has it
        // Deployed, so serving starts immediately.
        self.driver.deploy(&model.id).await?;
        Ok(())
    }

    async fn do_update(&self, model_id: &str, patch: ModelPatch) -> ComputeResult<Model> {
        let mut model = self.driver.show(model_id).await?;
        if let Some(name) = patch.name {
            model.name = name;
        }
        if let Some(hints) = patch.hints {
            model.hints = hints;
        }
        self.driver.create(&model).await?;
        Ok(model)
    }
}

/// Spawn a manager task, returning its command channel.
pub fn spawn_manager(
    hostname: &str,
    driver: Arc<dyn ModelDriver>,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Sender<Command>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let manager = ComputeManager::new(hostname, driver);
    let handle = tokio::spawn(manager.run(rx, shutdown));
    (tx, handle)
}
