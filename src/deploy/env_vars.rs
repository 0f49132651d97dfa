//! Built-in `BKPAAS_*` runtime variables of a module environment.

use crate::constants::BKPAAS_MAJOR_VERSION;
use crate::error::Result;
use crate::model::{Application, EnvName, Module};
use crate::svc_discovery::EntranceUrls;
use std::collections::BTreeMap;

pub const BKPAAS_APP_ID: &str = "BKPAAS_APP_ID";
pub const BKPAAS_APP_SECRET: &str = "BKPAAS_APP_SECRET";
pub const BKPAAS_APP_TENANT_ID: &str = "BKPAAS_APP_TENANT_ID";
pub const BKPAAS_APP_MODULE_NAME: &str = "BKPAAS_APP_MODULE_NAME";
pub const BKPAAS_ENVIRONMENT: &str = "BKPAAS_ENVIRONMENT";
pub const BKPAAS_MAJOR_VERSION_KEY: &str = "BKPAAS_MAJOR_VERSION";
pub const BKPAAS_ENGINE_REGION: &str = "BKPAAS_ENGINE_REGION";
pub const BKPAAS_DEFAULT_PREALLOCATED_URLS: &str = "BKPAAS_DEFAULT_PREALLOCATED_URLS";
pub const BKPAAS_SERVICE_ADDRESSES_BKSAAS: &str = "BKPAAS_SERVICE_ADDRESSES_BKSAAS";

/// Compute the built-in variables.
///
/// `preallocated` lists the entrance of every environment of the module and
/// is rendered as `{"stag": url, "prod": url}`, leaving out environments
/// without an address. The service discovery variable is only set when the
/// module declares peers.
pub fn builtin_env_vars(
    application: &Application,
    module: &Module,
    environment: EnvName,
    preallocated: &EntranceUrls,
    svc_discovery: Option<&str>,
) -> Result<BTreeMap<String, String>> {
    let urls: BTreeMap<&str, &str> = EnvName::ALL
        .iter()
        .filter_map(|env| preallocated.get(*env).map(|url| (env.as_str(), url)))
        .collect();

    let mut vars = BTreeMap::from([
        (BKPAAS_APP_ID.to_string(), application.code.clone()),
        (BKPAAS_APP_SECRET.to_string(), application.secret.clone()),
        (BKPAAS_APP_TENANT_ID.to_string(), application.tenant_id.clone()),
        (BKPAAS_APP_MODULE_NAME.to_string(), module.name.clone()),
        (BKPAAS_ENVIRONMENT.to_string(), environment.as_str().to_string()),
        (BKPAAS_MAJOR_VERSION_KEY.to_string(), BKPAAS_MAJOR_VERSION.to_string()),
        (BKPAAS_ENGINE_REGION.to_string(), application.region.clone()),
        (
            BKPAAS_DEFAULT_PREALLOCATED_URLS.to_string(),
            serde_json::to_string(&urls)?,
        ),
    ]);
    if let Some(value) = svc_discovery {
        vars.insert(BKPAAS_SERVICE_ADDRESSES_BKSAAS.to_string(), value.to_string());
    }
    Ok(vars)
}
