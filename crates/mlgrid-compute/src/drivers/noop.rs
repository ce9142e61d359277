//! Noop driver — a test double with call recording.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use mlgrid_core::Resources;
use mlgrid_registry::Model;

use crate::driver::{DriverKind, ModelDriver};
use crate::error::{ComputeError, ComputeResult};

/// Driver that accepts every operation, tracks models in memory, and
/// records the calls it receives so tests can assert on them.
pub struct NoopDriver {
    capacity: Resources,
    models: RwLock<HashMap<String, Model>>,
    calls: Mutex<Vec<String>>,
}

impl NoopDriver {
    pub fn new(capacity: Resources) -> Self {
        Self {
            capacity,
            models: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, in order ("create mnist", "delete mnist", ...).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("call log poisoned").push(call);
    }
}

#[async_trait]
impl ModelDriver for NoopDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Noop
    }

    async fn create(&self, model: &Model) -> ComputeResult<()> {
        self.record(format!("create {}", model.id));
        self.models
            .write()
            .expect("model table poisoned")
            .insert(model.id.clone(), model.clone());
        Ok(())
    }

    async fn delete(&self, model_id: &str, force: bool) -> ComputeResult<()> {
        self.record(format!("delete {model_id} force={force}"));
        self.models
            .write()
            .expect("model table poisoned")
            .remove(model_id);
        Ok(())
    }

    async fn show(&self, model_id: &str) -> ComputeResult<Model> {
        self.record(format!("show {model_id}"));
        self.models
            .read()
            .expect("model table poisoned")
            .get(model_id)
            .cloned()
            .ok_or_else(|| ComputeError::ModelNotRunning(model_id.to_string()))
    }

    async fn train(&self, model: &Model) -> ComputeResult<()> {
        self.record(format!("train {}", model.id));
        Ok(())
    }

    async fn deploy(&self, model_id: &str) -> ComputeResult<()> {
        self.record(format!("deploy {model_id}"));
        Ok(())
    }

    async fn undeploy(&self, model_id: &str) -> ComputeResult<()> {
        self.record(format!("undeploy {model_id}"));
        Ok(())
    }

    async fn predict(&self, model_id: &str, payload: &[u8]) -> ComputeResult<Vec<u8>> {
        self.record(format!("predict {model_id}"));
        // Echo the payload back so round-trips are observable.
        Ok(payload.to_vec())
    }

    async fn get_available_resources(&self, _host: &str) -> ComputeResult<Resources> {
        Ok(self.capacity)
    }
}
