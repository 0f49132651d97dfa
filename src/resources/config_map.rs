//! ConfigMap entity.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMapEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl ResourceEntity for ConfigMapEntity {
    const KIND: Kind = Kind::ConfigMap;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let cm = ConfigMap {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            data: Some(self.data.clone()),
            ..ConfigMap::default()
        };
        let mut obj = to_dynamic(Self::KIND, &cm)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let cm: ConfigMap = from_dynamic(obj)?;
        Ok(Self {
            name: cm.metadata.name.unwrap_or_default(),
            labels: cm.metadata.labels.unwrap_or_default(),
            data: cm.data.unwrap_or_default(),
        })
    }
}
