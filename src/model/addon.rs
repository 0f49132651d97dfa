//! Enhanced services bound to a module.

use crate::model::app::EnvName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonTls {
    pub ca: Option<String>,
    pub cert: String,
    pub key: String,
}

/// A provisioned (or shared) enhanced service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstanceBinding {
    pub module_id: Uuid,
    pub environment: EnvName,
    /// Provider name, e.g. `mysql`
    pub service_name: String,
    pub plan_name: String,
    pub credentials: BTreeMap<String, String>,
    pub tls: Option<AddonTls>,
    /// Module the instance is shared from, if any
    pub shared_from: Option<String>,
}
