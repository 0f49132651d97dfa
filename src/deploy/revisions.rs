//! Revision allocation.

use crate::error::{Error, Result};
use crate::manifest::parse_revision_spec;
use crate::model::AppModelRevision;
use crate::store::SharedRepository;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Creates revisions; versions of one module are allocated one at a time
#[derive(Clone)]
pub struct RevisionService {
    store: SharedRepository,
    locks: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl std::fmt::Debug for RevisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionService").finish_non_exhaustive()
    }
}

impl RevisionService {
    pub fn new(store: SharedRepository) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn module_lock(&self, module_id: Uuid) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Transient("revision lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(module_id).or_default()))
    }

    /// Store `json_value` as the next revision of the module.
    ///
    /// The manifest is validated first; an invalid one never gets a version.
    pub async fn create_revision(
        &self,
        module_id: Uuid,
        json_value: serde_json::Value,
        operator: &str,
    ) -> Result<AppModelRevision> {
        parse_revision_spec(&json_value)?;
        let module = self.store.get_module(module_id).await?;

        let lock = self.module_lock(module_id)?;
        let _guard = lock.lock().await;

        let version = self.store.max_revision_version(module_id).await? + 1;
        let now = Utc::now();
        let revision = self
            .store
            .insert_revision(AppModelRevision {
                id: 0,
                application_id: module.application_id,
                module_id,
                version,
                json_value,
                deployed_value: None,
                has_deployed: false,
                created_by: operator.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(module.id = %module_id, revision.id = revision.id, version, "Created revision");
        Ok(revision)
    }

    /// Replace the manifest of a revision that has not been deployed
    pub async fn update_revision(&self, id: i64, json_value: serde_json::Value) -> Result<AppModelRevision> {
        parse_revision_spec(&json_value)?;
        let mut revision = self.store.get_revision(id).await?;
        revision.update_json_value(json_value)?;
        self.store.save_revision(&revision).await?;
        Ok(revision)
    }
}
