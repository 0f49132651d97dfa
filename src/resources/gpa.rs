//! GeneralPodAutoscaler entity for processes with autoscaling enabled.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpaEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Deployment being scaled
    pub target_deployment: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub policy: String,
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
    scale_target_ref: ScaleTargetRef,
    #[serde(default)]
    min_replicas: i32,
    #[serde(default)]
    max_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ScaleTargetRef {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

impl ResourceEntity for GpaEntity {
    const KIND: Kind = Kind::GeneralPodAutoscaler;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let wire = Wire {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            spec: WireSpec {
                scale_target_ref: ScaleTargetRef {
                    api_version: Kind::Deployment.api_version(),
                    kind: Kind::Deployment.wire_kind().to_string(),
                    name: self.target_deployment.clone(),
                },
                min_replicas: self.min_replicas,
                max_replicas: self.max_replicas,
                policy: Some(self.policy.clone()),
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
            target_deployment: wire.spec.scale_target_ref.name,
            min_replicas: wire.spec.min_replicas,
            max_replicas: wire.spec.max_replicas,
            policy: wire.spec.policy.unwrap_or_else(|| "default".to_string()),
        })
    }
}
