use tokio::task;
use tracing::{debug, info};

use crate::config::FleetConfig;
use crate::model::{InstancePatch, InstanceRecord, InstanceStatus};
use crate::store::RecordStore;
use crate::{AppError, AppResult};

pub const ERR_INVALID_STATUS: &str = "FLEET/INVALID_STATUS";
pub const ERR_INVALID_ID: &str = "FLEET/INVALID_ID";
pub const ERR_CONFLICT: &str = "FLEET/CONFLICT";
pub const ERR_TASK: &str = "FLEET/TASK";

/// CRUD over the instances of a [`RecordStore`].
///
/// Every call reloads the full document and every mutation writes it back.
/// Nothing is cached and no lock is held between the load and the save, so
/// overlapping writers race and the last save wins.
#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    store: RecordStore,
}

fn validate(record: &InstanceRecord) -> AppResult<()> {
    if record.id.trim().is_empty() {
        return Err(AppError::new(ERR_INVALID_ID, "Instance id must not be empty"));
    }
    record.status.parse::<InstanceStatus>().map_err(|err| {
        AppError::new(ERR_INVALID_STATUS, err.to_string())
            .with_context("id", record.id.clone())
            .with_context("status", record.status.clone())
    })?;
    Ok(())
}

impl InstanceRegistry {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(RecordStore::from_config(config))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn list(&self) -> Vec<InstanceRecord> {
        self.store.load().instances.into_values().collect()
    }

    pub fn get(&self, id: &str) -> Option<InstanceRecord> {
        self.store.load().instances.remove(id)
    }

    /// Insert `record`, replacing any instance that already uses its id.
    pub fn create(&self, record: InstanceRecord) -> AppResult<InstanceRecord> {
        self.insert(record, true)
    }

    /// Insert `record`, failing with [`ERR_CONFLICT`] if its id is taken.
    pub fn create_unique(&self, record: InstanceRecord) -> AppResult<InstanceRecord> {
        self.insert(record, false)
    }

    fn insert(&self, record: InstanceRecord, replace: bool) -> AppResult<InstanceRecord> {
        validate(&record)?;

        let mut doc = self.store.load();
        let replaced = doc.contains(&record.id);
        if replaced && !replace {
            return Err(
                AppError::new(ERR_CONFLICT, "An instance with this id already exists")
                    .with_context("id", record.id.clone()),
            );
        }

        doc.insert(record.clone());
        self.store.save(&doc)?;
        info!(
            target: "fleetkeeper",
            event = "instance_created",
            id = %record.id,
            status = %record.status,
            replaced
        );
        Ok(record)
    }

    /// Merge `patch` into the instance. `Ok(None)` when the id is unknown, in
    /// which case nothing is written.
    pub fn patch(&self, id: &str, patch: InstancePatch) -> AppResult<Option<InstanceRecord>> {
        let mut doc = self.store.load();
        let Some(record) = doc.instances.get_mut(id) else {
            debug!(target: "fleetkeeper", event = "instance_patch_missing", id = %id);
            return Ok(None);
        };

        patch.apply_to(record);
        let updated = record.clone();
        self.store.save(&doc)?;
        info!(
            target: "fleetkeeper",
            event = "instance_patched",
            id = %id,
            status = %updated.status
        );
        Ok(Some(updated))
    }

    /// Delete the instance and hand back its last stored value. `Ok(None)`
    /// when the id is unknown, in which case nothing is written.
    pub fn remove(&self, id: &str) -> AppResult<Option<InstanceRecord>> {
        let mut doc = self.store.load();
        let Some(removed) = doc.instances.remove(id) else {
            debug!(target: "fleetkeeper", event = "instance_remove_missing", id = %id);
            return Ok(None);
        };

        self.store.save(&doc)?;
        info!(target: "fleetkeeper", event = "instance_removed", id = %id);
        Ok(Some(removed))
    }

    /// Run `f` against this registry on the blocking thread pool.
    ///
    /// The spawned task is not cancelled when the returned future is dropped,
    /// so a save that has started always finishes.
    pub async fn run_blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&InstanceRegistry) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.clone();
        task::spawn_blocking(move || f(&registry))
            .await
            .map_err(|err| {
                AppError::new(ERR_TASK, "Registry task panicked")
                    .with_context("error", err.to_string())
            })?
    }
}
