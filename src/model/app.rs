//! Applications, modules and environments.
//!
//! These are owned upstream; the core only reads them.

use crate::model::cluster::Cluster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fixed environment names of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvName {
    Stag,
    Prod,
}

impl EnvName {
    pub const ALL: [EnvName; 2] = [EnvName::Stag, EnvName::Prod];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvName::Stag => "stag",
            EnvName::Prod => "prod",
        }
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvName {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stag" => Ok(EnvName::Stag),
            "prod" => Ok(EnvName::Prod),
            other => Err(crate::error::Error::Validation(format!(
                "unknown environment '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub tenant_id: String,
    pub region: String,
    /// Secret handed to the workload as `BKPAAS_APP_SECRET`
    pub secret: String,
    pub access_control_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub is_default: bool,
    /// Whether images of this module are built with cloud-native buildpacks
    pub use_cnb: bool,
    pub log_collector_type: String,
}

/// A (module, environment) pair and the WlApp scheduling it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEnv {
    pub module_id: Uuid,
    pub environment: EnvName,
    pub wl_app_uuid: Uuid,
}

/// Everything needed to address one environment inside its cluster
#[derive(Debug, Clone)]
pub struct EnvTarget {
    pub application: Application,
    pub module: Module,
    pub environment: EnvName,
    pub cluster: Cluster,
    pub namespace: String,
    pub bkapp_name: String,
    pub wl_app_name: String,
}

impl EnvTarget {
    /// Label selector matching every object owned by this environment
    pub fn label_selector(&self) -> String {
        crate::resources::labels::selector(&crate::resources::labels::app_labels(
            &self.application.code,
            &self.module.name,
            self.environment,
        ))
    }
}
