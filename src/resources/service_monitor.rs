//! Prometheus-operator ServiceMonitor entity, one per monitored process.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEndpoint {
    pub port: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Vec<String>>,
}

fn default_path() -> String {
    "/metrics".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMonitorEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub namespace_selector: Vec<String>,
    pub endpoints: Vec<MonitorEndpoint>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Wire {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: WireSpec,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireSpec {
    #[serde(default)]
    selector: LabelSelector,
    #[serde(default)]
    namespace_selector: WireNamespaceSelector,
    #[serde(default)]
    endpoints: Vec<MonitorEndpoint>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireNamespaceSelector {
    #[serde(default)]
    match_names: Vec<String>,
}

impl ResourceEntity for ServiceMonitorEntity {
    const KIND: Kind = Kind::ServiceMonitor;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let wire = Wire {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            spec: WireSpec {
                selector: LabelSelector {
                    match_labels: Some(self.selector.clone()),
                    ..LabelSelector::default()
                },
                namespace_selector: WireNamespaceSelector {
                    match_names: self.namespace_selector.clone(),
                },
                endpoints: self.endpoints.clone(),
            },
        };
        let mut obj = to_dynamic(Self::KIND, &wire)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let wire: Wire = from_dynamic(obj)?;
        Ok(Self {
            name: wire.metadata.name.unwrap_or_default(),
            labels: wire.metadata.labels.unwrap_or_default(),
            selector: wire.spec.selector.match_labels.unwrap_or_default(),
            namespace_selector: wire.spec.namespace_selector.match_names,
            endpoints: wire.spec.endpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_path_defaults_to_metrics() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "ServiceMonitor",
            "metadata": {"name": "demo--web"},
            "spec": {"endpoints": [{"port": "metrics"}], "jobLabel": "ignored"}
        }))
        .unwrap();
        let sm = ServiceMonitorEntity::deserialize(&obj).unwrap();
        assert_eq!(sm.endpoints[0].path, "/metrics");
        assert_eq!(
            ServiceMonitorEntity::deserialize(&sm.serialize(None).unwrap()).unwrap(),
            sm
        );
    }
}
