//! Registry — redb-backed persistence for mlgrid records.
//!
//! Provides typed CRUD operations over models, compute hosts, and
//! flavors. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).
//!
//! `create_*` fails with `Duplicate` when the unique key is taken;
//! `get_*`, `save_*` and `delete_*` fail with `NotFound` when the
//! record is absent. `save_*` is a whole-record replace, matching the
//! point-in-time contract the rest of the control plane assumes.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `RegistryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RegistryError::$variant(e.to_string())
    };
}

/// Thread-safe registry backed by redb.
#[derive(Clone, Debug)]
pub struct Registry {
    db: Arc<Database>,
}

impl Registry {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!(?path, "registry opened");
        Ok(registry)
    }

    /// Create an ephemeral in-memory registry (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!("in-memory registry opened");
        Ok(registry)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(MODELS).map_err(map_err!(Table))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(FLAVORS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic row operations ─────────────────────────────────────

    fn insert_row<T: Serialize>(
        &self,
        table_def: TableDefinition<&str, &[u8]>,
        kind: &'static str,
        key: &str,
        record: &T,
        must_be_new: bool,
    ) -> RegistryResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            let existed = table.get(key).map_err(map_err!(Read))?.is_some();
            if must_be_new && existed {
                return Err(RegistryError::duplicate(kind, key));
            }
            if !must_be_new && !existed {
                return Err(RegistryError::not_found(kind, key));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<&str, &[u8]>,
        kind: &'static str,
        key: &str,
    ) -> RegistryResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Err(RegistryError::not_found(kind, key)),
        }
    }

    fn list_rows<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<&str, &[u8]>,
    ) -> RegistryResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    fn delete_row(
        &self,
        table_def: TableDefinition<&str, &[u8]>,
        kind: &'static str,
        key: &str,
    ) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if !existed {
            return Err(RegistryError::not_found(kind, key));
        }
        debug!(%key, kind, "record deleted");
        Ok(())
    }

    // ── Models ─────────────────────────────────────────────────────

    /// Insert a new model. Fails with `Duplicate` if the id is taken.
    pub fn create_model(&self, model: &Model) -> RegistryResult<()> {
        self.insert_row(MODELS, "model", &model.id, model, true)?;
        debug!(model = %model.id, name = %model.name, "model created");
        Ok(())
    }

    /// Get a model by id.
    pub fn get_model(&self, id: &str) -> RegistryResult<Model> {
        self.get_row(MODELS, "model", id)
    }

    /// Replace an existing model record.
    pub fn save_model(&self, model: &Model) -> RegistryResult<()> {
        self.insert_row(MODELS, "model", &model.id, model, false)?;
        debug!(model = %model.id, status = %model.status, "model saved");
        Ok(())
    }

    /// List all models.
    pub fn list_models(&self) -> RegistryResult<Vec<Model>> {
        self.list_rows(MODELS)
    }

    /// Delete a model by id.
    pub fn delete_model(&self, id: &str) -> RegistryResult<()> {
        self.delete_row(MODELS, "model", id)
    }

    // ── Compute hosts ──────────────────────────────────────────────

    /// Register a new host. Fails with `Duplicate` on a taken hostname.
    pub fn create_host(&self, host: &ComputeHost) -> RegistryResult<()> {
        self.insert_row(HOSTS, "host", &host.hostname, host, true)?;
        debug!(host = %host.hostname, driver = %host.driver, "host registered");
        Ok(())
    }

    /// Get a host by hostname.
    pub fn get_host(&self, hostname: &str) -> RegistryResult<ComputeHost> {
        self.get_row(HOSTS, "host", hostname)
    }

    /// Replace an existing host record.
    pub fn save_host(&self, host: &ComputeHost) -> RegistryResult<()> {
        self.insert_row(HOSTS, "host", &host.hostname, host, false)
    }

    /// List all registered hosts.
    pub fn list_hosts(&self) -> RegistryResult<Vec<ComputeHost>> {
        self.list_rows(HOSTS)
    }

    // ── Flavors ────────────────────────────────────────────────────

    /// Insert a new flavor. Fails with `Duplicate` if the id is taken.
    pub fn create_flavor(&self, flavor: &Flavor) -> RegistryResult<()> {
        self.insert_row(FLAVORS, "flavor", &flavor.id, flavor, true)?;
        debug!(flavor = %flavor.id, name = %flavor.name, "flavor created");
        Ok(())
    }

    /// Get a flavor by id.
    pub fn get_flavor(&self, id: &str) -> RegistryResult<Flavor> {
        self.get_row(FLAVORS, "flavor", id)
    }

    /// List all flavors.
    pub fn list_flavors(&self) -> RegistryResult<Vec<Flavor>> {
        self.list_rows(FLAVORS)
    }

    /// Delete a flavor by id.
    pub fn delete_flavor(&self, id: &str) -> RegistryResult<()> {
        self.delete_row(FLAVORS, "flavor", id)
    }
}
