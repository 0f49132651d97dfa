//! Deployment entity, one per BkApp process.
//!
//! The operator owns these objects; the deployer reads them to build the
//! process read model and only writes them in tests.

use super::labels::{PROCESS_NAME, REVISION};
use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub replicas: i32,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// Pods selected by this deployment carry these labels
    pub pod_labels: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl DeploymentEntity {
    pub fn process_name(&self) -> Option<&str> {
        self.labels.get(PROCESS_NAME).map(String::as_str)
    }

    /// BkApp revision that produced the deployment, 0 when unknown
    pub fn revision(&self) -> i64 {
        self.annotations
            .get(REVISION)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

impl ResourceEntity for DeploymentEntity {
    const KIND: Kind = Kind::Deployment;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let deployment = Deployment {
            metadata: object_meta(&self.name, &self.labels, &self.annotations),
            spec: Some(DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.pod_labels.clone()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.pod_labels.clone()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: self.process_name().unwrap_or("main").to_string(),
                            image: Some(self.image.clone()),
                            command: (!self.command.is_empty()).then(|| self.command.clone()),
                            args: (!self.args.is_empty()).then(|| self.args.clone()),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };

        let mut obj = to_dynamic(Self::KIND, &deployment)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let deployment: Deployment = from_dynamic(obj)?;
        let spec = deployment.spec.unwrap_or_default();
        let container = spec
            .template
            .spec
            .and_then(|s| s.containers.into_iter().next())
            .unwrap_or_default();

        Ok(Self {
            name: deployment.metadata.name.unwrap_or_default(),
            labels: deployment.metadata.labels.unwrap_or_default(),
            annotations: deployment.metadata.annotations.unwrap_or_default(),
            replicas: spec.replicas.unwrap_or(1),
            image: container.image.unwrap_or_default(),
            command: container.command.unwrap_or_default(),
            args: container.args.unwrap_or_default(),
            pod_labels: spec.selector.match_labels.unwrap_or_default(),
            resource_version: deployment.metadata.resource_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_process_fields() {
        let entity = DeploymentEntity {
            name: "demo--web".to_string(),
            labels: BTreeMap::from([(PROCESS_NAME.to_string(), "web".to_string())]),
            annotations: BTreeMap::from([(REVISION.to_string(), "3".to_string())]),
            replicas: 2,
            image: "registry.local/demo:v1".to_string(),
            command: vec!["gunicorn".to_string()],
            args: vec!["wsgi".to_string()],
            pod_labels: BTreeMap::from([(PROCESS_NAME.to_string(), "web".to_string())]),
            resource_version: None,
        };
        let back = DeploymentEntity::deserialize(&entity.serialize(None).unwrap()).unwrap();
        assert_eq!(back, entity);
        assert_eq!(back.process_name(), Some("web"));
        assert_eq!(back.revision(), 3);
    }
}
