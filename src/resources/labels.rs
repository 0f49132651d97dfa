//! Label and annotation keys shared with the on-cluster operator and monitoring.
//!
//! Keys are contractual: renaming one breaks the operator.

use crate::model::EnvName;
use std::collections::BTreeMap;

// ============================================================================
// Labels
// ============================================================================

pub const MONITORING_APP_CODE: &str = "monitoring.bk.tencent.com/bk_app_code";
pub const MONITORING_MODULE_NAME: &str = "monitoring.bk.tencent.com/module_name";
pub const MONITORING_ENVIRONMENT: &str = "monitoring.bk.tencent.com/environment";

pub const BKAPP_CODE: &str = "bkapp.paas.bk.tencent.com/code";
pub const BKAPP_MODULE_NAME: &str = "bkapp.paas.bk.tencent.com/module-name";
pub const BKAPP_ENVIRONMENT: &str = "bkapp.paas.bk.tencent.com/environment";

/// Required on every per-process object
pub const PROCESS_NAME: &str = "bkapp.paas.bk.tencent.com/process-name";

/// Set on pods; revision of the BkApp that produced them
pub const REVISION: &str = "bkapp.paas.bk.tencent.com/revision";

// ============================================================================
// Annotations (namespace `bkapp.paas.bk.tencent.com/`)
// ============================================================================

pub const ANNO_ACCESS_CONTROL: &str = "bkapp.paas.bk.tencent.com/access-control";
pub const ANNO_DEPLOY_ID: &str = "bkapp.paas.bk.tencent.com/bkpaas-deploy-id";
pub const ANNO_ADDONS: &str = "bkapp.paas.bk.tencent.com/addons";
pub const ANNO_REGION: &str = "bkapp.paas.bk.tencent.com/region";
pub const ANNO_NAME: &str = "bkapp.paas.bk.tencent.com/name";
pub const ANNO_CODE: &str = "bkapp.paas.bk.tencent.com/code";
pub const ANNO_MODULE_NAME: &str = "bkapp.paas.bk.tencent.com/module-name";
pub const ANNO_ENVIRONMENT: &str = "bkapp.paas.bk.tencent.com/environment";
pub const ANNO_WL_APP_NAME: &str = "bkapp.paas.bk.tencent.com/wl-app-name";
pub const ANNO_IMAGE_CREDENTIALS: &str = "bkapp.paas.bk.tencent.com/image-credentials";
pub const ANNO_PAAS_ANALYSIS_SITE_ID: &str = "bkapp.paas.bk.tencent.com/paas-analysis-site-id";
pub const ANNO_RESOURCE_TYPE: &str = "bkapp.paas.bk.tencent.com/resource-type";
pub const ANNO_USE_CNB: &str = "bkapp.paas.bk.tencent.com/use-cnb";
pub const ANNO_LOG_COLLECTOR_TYPE: &str = "bkapp.paas.bk.tencent.com/log-collector-type";
pub const ANNO_PROC_SERVICES_FEATURE_ENABLED: &str =
    "bkapp.paas.bk.tencent.com/proc-services-feature-enabled";

/// The six labels carried by every object owned by one environment
pub fn app_labels(code: &str, module_name: &str, env: EnvName) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MONITORING_APP_CODE.to_string(), code.to_string()),
        (MONITORING_MODULE_NAME.to_string(), module_name.to_string()),
        (MONITORING_ENVIRONMENT.to_string(), env.as_str().to_string()),
        (BKAPP_CODE.to_string(), code.to_string()),
        (BKAPP_MODULE_NAME.to_string(), module_name.to_string()),
        (BKAPP_ENVIRONMENT.to_string(), env.as_str().to_string()),
    ])
}

/// [`app_labels`] plus the process name
pub fn process_labels(
    code: &str,
    module_name: &str,
    env: EnvName,
    process: &str,
) -> BTreeMap<String, String> {
    let mut labels = app_labels(code, module_name, env);
    labels.insert(PROCESS_NAME.to_string(), process.to_string());
    labels
}

/// Render labels as an equality-based label selector
pub fn selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// True when `labels` carries every contractual app label
pub fn has_app_labels(labels: &BTreeMap<String, String>) -> bool {
    [
        MONITORING_APP_CODE,
        MONITORING_MODULE_NAME,
        MONITORING_ENVIRONMENT,
        BKAPP_CODE,
        BKAPP_MODULE_NAME,
        BKAPP_ENVIRONMENT,
    ]
    .iter()
    .all(|k| labels.contains_key(*k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_labels_extend_app_labels() {
        let labels = process_labels("demo", "default", EnvName::Stag, "web");
        assert!(has_app_labels(&labels));
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.get(PROCESS_NAME).map(String::as_str), Some("web"));
    }

    #[test]
    fn test_selector_is_sorted() {
        let labels = BTreeMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(selector(&labels), "a=1,b=2");
    }
}
