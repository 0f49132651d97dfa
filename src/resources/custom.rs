//! BkApp and DomainGroupMapping custom resources as entities.
//!
//! Status is owned by the operator and never written back.

use super::{from_dynamic, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::crd::{BkApp, DomainGroupMapping};
use crate::error::Result;
use kube::api::DynamicObject;

impl ResourceEntity for BkApp {
    const KIND: Kind = Kind::BkApp;

    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let mut obj = to_dynamic(Self::KIND, self)?;
        if let Some(map) = obj.data.as_object_mut() {
            map.remove("status");
        }
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        from_dynamic(obj)
    }
}

impl ResourceEntity for DomainGroupMapping {
    const KIND: Kind = Kind::DomainGroupMapping;

    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let mut obj = to_dynamic(Self::KIND, self)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        from_dynamic(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BkAppSpec, BkAppStatus};
    use serde_json::json;

    #[test]
    fn test_bkapp_status_is_not_written() {
        let mut bkapp = BkApp::new("demo", BkAppSpec::default());
        bkapp.status = Some(BkAppStatus {
            phase: Some("Running".to_string()),
            ..BkAppStatus::default()
        });
        let obj = bkapp.serialize(None).unwrap();
        assert!(obj.data.get("status").is_none());
        assert_eq!(obj.types.map(|t| t.api_version).as_deref(), Some("paas.bk.tencent.com/v1alpha2"));
    }

    #[test]
    fn test_bkapp_deserialize_tolerates_unknown_fields() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "paas.bk.tencent.com/v1alpha2",
            "kind": "BkApp",
            "metadata": {"name": "demo", "resourceVersion": "7"},
            "spec": {"processes": [{"name": "web", "futureKnob": 1}], "extra": {}},
            "status": {"phase": "Running", "deployId": "demo-1-1", "newField": []}
        }))
        .unwrap();
        let bkapp = BkApp::deserialize(&obj).unwrap();
        assert_eq!(bkapp.spec.processes[0].name, "web");
        assert_eq!(
            bkapp.status.and_then(|s| s.deploy_id).as_deref(),
            Some("demo-1-1")
        );
    }
}
