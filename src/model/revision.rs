//! Frozen BkApp manifests.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One rendered BkApp manifest of a module
///
/// `deployed_value` and `has_deployed` only ever change together, once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppModelRevision {
    pub id: i64,
    pub application_id: Uuid,
    pub module_id: Uuid,
    pub version: u32,
    pub json_value: serde_json::Value,
    pub deployed_value: Option<serde_json::Value>,
    pub has_deployed: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppModelRevision {
    /// Record the manifest that was applied to the cluster
    pub fn mark_deployed(&mut self, applied: serde_json::Value) -> Result<()> {
        if self.has_deployed {
            return Err(Error::Conflict(format!(
                "revision {} (v{}) has already been deployed",
                self.id, self.version
            )));
        }
        self.deployed_value = Some(applied);
        self.has_deployed = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the requested manifest of a revision that was never deployed
    pub fn update_json_value(&mut self, json_value: serde_json::Value) -> Result<()> {
        if self.has_deployed {
            return Err(Error::Conflict(format!(
                "revision {} (v{}) is frozen once deployed",
                self.id, self.version
            )));
        }
        self.json_value = json_value;
        self.updated_at = Utc::now();
        Ok(())
    }
}
