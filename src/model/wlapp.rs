//! WlApp scheduling handles and their Config snapshots.

use crate::model::app::EnvName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WlAppType {
    Default,
    CloudNative,
}

/// Scheduling handle of one (module, environment)
///
/// `uuid` is the only key other records use to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlApp {
    pub uuid: Uuid,
    pub name: String,
    pub namespace: String,
    pub app_type: WlAppType,
    pub tenant_id: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlAppMetadata {
    pub paas_app_code: String,
    pub module_name: String,
    pub environment: EnvName,
    #[serde(default)]
    pub addons: Vec<String>,
    #[serde(default)]
    pub bkpaas_deploy_id: Option<String>,
}

/// Immutable Config snapshot; the newest one is current
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlAppConfig {
    pub wl_app_uuid: Uuid,
    pub created: DateTime<Utc>,
    pub env_vars: BTreeMap<String, String>,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
    pub cluster: Option<String>,
    pub metadata: WlAppMetadata,
}

impl WlAppConfig {
    /// Start a new snapshot from this one
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            created: Utc::now(),
            ..self.clone()
        }
    }
}
