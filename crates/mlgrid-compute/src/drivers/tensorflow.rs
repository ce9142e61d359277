//! TensorFlow serving driver.
//!
//! Tracks the models hosted on this node and answers predictions with
//! a serving-style JSON document. The artifact handling is a
//! placeholder — the interesting part is the capability surface the
//! rest of the control plane programs against.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use mlgrid_core::Resources;
use mlgrid_registry::Model;

use crate::driver::{DriverKind, ModelDriver};
use crate::error::{ComputeError, ComputeResult};

/// Per-model serving entry.
struct Served {
    model: Model,
    serving: bool,
}

/// `ModelDriver` for TensorFlow-style serving.
pub struct TensorflowDriver {
    capacity: Resources,
    models: RwLock<HashMap<String, Served>>,
}

impl TensorflowDriver {
    pub fn new(capacity: Resources) -> Self {
        Self {
            capacity,
            models: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ModelDriver for TensorflowDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Tensorflow
    }

    async fn create(&self, model: &Model) -> ComputeResult<()> {
        let mut models = self.models.write().expect("driver model table poisoned");
        models.insert(
            model.id.clone(),
            Served {
                model: model.clone(),
                serving: false,
            },
        );
        info!(model = %model.id, name = %model.name, "model materialized");
        Ok(())
    }

    async fn delete(&self, model_id: &str, force: bool) -> ComputeResult<()> {
        let mut models = self.models.write().expect("driver model table poisoned");
        match models.remove(model_id) {
            Some(_) => {
                info!(model = %model_id, force, "model removed");
                Ok(())
            }
            // Forced teardown tolerates an already-gone model.
            None if force => Ok(()),
            None => Err(ComputeError::ModelNotRunning(model_id.to_string())),
        }
    }

    async fn show(&self, model_id: &str) -> ComputeResult<Model> {
        let models = self.models.read().expect("driver model table poisoned");
        models
            .get(model_id)
            .map(|served| served.model.clone())
            .ok_or_else(|| ComputeError::ModelNotRunning(model_id.to_string()))
    }

    async fn train(&self, model: &Model) -> ComputeResult<()> {
        // Training happens out-of-band for serving nodes.
        debug!(model = %model.id, "train requested on serving node");
        Ok(())
    }

    async fn deploy(&self, model_id: &str) -> ComputeResult<()> {
        let mut models = self.models.write().expect("driver model table poisoned");
        let served = models
            .get_mut(model_id)
            .ok_or_else(|| ComputeError::ModelNotRunning(model_id.to_string()))?;
        served.serving = true;
        info!(model = %model_id, "model serving");
        Ok(())
    }

    async fn undeploy(&self, model_id: &str) -> ComputeResult<()> {
        let mut models = self.models.write().expect("driver model table poisoned");
        let served = models
            .get_mut(model_id)
            .ok_or_else(|| ComputeError::ModelNotRunning(model_id.to_string()))?;
        served.serving = false;
        info!(model = %model_id, "model serving stopped");
        Ok(())
    }

    async fn predict(&self, model_id: &str, payload: &[u8]) -> ComputeResult<Vec<u8>> {
        let models = self.models.read().expect("driver model table poisoned");
        let served = models
            .get(model_id)
            .ok_or_else(|| ComputeError::ModelNotRunning(model_id.to_string()))?;
        if !served.serving {
            return Err(ComputeError::Driver(format!(
                "model {model_id} is not serving"
            )));
        }
        let result = json!({
            "model": served.model.name,
            "model_id": model_id,
            "input_bytes": payload.len(),
            "predictions": [],
        });
        serde_json::to_vec(&result).map_err(|e| ComputeError::Driver(e.to_string()))
    }

    async fn get_available_resources(&self, host: &str) -> ComputeResult<Resources> {
        debug!(%host, cpu = self.capacity.cpu, memory_mb = self.capacity.memory_mb, "inventory reported");
        Ok(self.capacity)
    }
}
