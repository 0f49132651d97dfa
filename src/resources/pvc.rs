//! PersistentVolumeClaim entity backing `persistentStorage` mounts.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PvcEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub storage_class: Option<String>,
    /// Requested size, e.g. `1Gi`
    pub size: String,
    pub access_modes: Vec<String>,
}

impl ResourceEntity for PvcEntity {
    const KIND: Kind = Kind::PersistentVolumeClaim;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let pvc = PersistentVolumeClaim {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(self.access_modes.clone()),
                storage_class_name: self.storage_class.clone(),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(self.size.clone()),
                    )])),
                    ..VolumeResourceRequirements::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            ..PersistentVolumeClaim::default()
        };
        let mut obj = to_dynamic(Self::KIND, &pvc)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let pvc: PersistentVolumeClaim = from_dynamic(obj)?;
        let spec = pvc.spec.unwrap_or_default();
        Ok(Self {
            name: pvc.metadata.name.unwrap_or_default(),
            labels: pvc.metadata.labels.unwrap_or_default(),
            storage_class: spec.storage_class_name,
            size: spec
                .resources
                .and_then(|r| r.requests)
                .and_then(|mut r| r.remove("storage"))
                .map(|q| q.0)
                .unwrap_or_default(),
            access_modes: spec.access_modes.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pvc = PvcEntity {
            name: "demo-data".to_string(),
            labels: BTreeMap::new(),
            storage_class: Some("cfs".to_string()),
            size: "1Gi".to_string(),
            access_modes: vec!["ReadWriteMany".to_string()],
        };
        assert_eq!(PvcEntity::deserialize(&pvc.serialize(None).unwrap()).unwrap(), pvc);
    }
}
