//! Inputs of the manifest compiler.

use super::ManifestConstructorError;
use crate::crd::BkAppSpec;
use crate::model::{Application, Build, EnvName, Module, ServiceInstanceBinding};
use std::collections::BTreeMap;

/// Everything the constructors read; assembled once per deploy
#[derive(Debug, Clone)]
pub struct ModuleState {
    pub application: Application,
    pub module: Module,
    /// Environment being deployed
    pub environment: EnvName,
    pub bkapp_name: String,
    pub wl_app_name: String,
    /// Id of the deploy record, echoed back by the operator in `status.deployId`
    pub deploy_id: Option<String>,
    /// Desired spec as stored in the revision
    pub spec: BkAppSpec,
    pub latest_build: Option<Build>,
    /// `BKPAAS_*` variables of `environment`
    pub builtin_env_vars: BTreeMap<String, String>,
    pub addon_bindings: Vec<ServiceInstanceBinding>,
    /// Secret holding the registry credentials, when the spec references any
    pub image_credentials_secret: Option<String>,
    pub proc_services_enabled: bool,
    pub paas_analysis_site_id: Option<String>,
}

/// Parse the desired spec of a revision.
///
/// Both a bare spec and a full BkApp manifest (`{"spec": {...}}`) are accepted.
/// Unknown fields are ignored; unknown enum values such as an unsupported
/// `resQuotaPlan` are rejected.
pub fn parse_revision_spec(
    json_value: &serde_json::Value,
) -> Result<BkAppSpec, ManifestConstructorError> {
    let spec = json_value.get("spec").unwrap_or(json_value);
    serde_json::from_value(spec.clone())
        .map_err(|e| ManifestConstructorError::InvalidSpec(e.to_string()))
}
