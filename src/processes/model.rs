//! Processes and instances as read from the cluster.

use crate::error::Result;
use crate::resources::labels::{PROCESS_NAME, REVISION};
use crate::resources::{from_dynamic, DeploymentEntity};
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use serde::Serialize;

/// One process type of an environment, backed by a Deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Process {
    /// Process type, e.g. `web`
    pub name: String,
    pub deployment_name: String,
    pub replicas: i32,
    /// Command and arguments joined by spaces
    pub command: String,
    pub image: String,
    /// BkApp revision that produced the Deployment
    pub version: i64,
    pub instances: Vec<Instance>,
}

impl Process {
    /// `None` for Deployments that do not belong to a process
    pub fn from_deployment(entity: &DeploymentEntity) -> Option<Self> {
        let name = entity.process_name()?.to_string();
        Some(Self {
            name,
            deployment_name: entity.name.clone(),
            replicas: entity.replicas,
            command: entity
                .command
                .iter()
                .chain(&entity.args)
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            image: entity.image.clone(),
            version: entity.revision(),
            instances: Vec::new(),
        })
    }
}

/// One pod of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub name: String,
    pub host_ip: Option<String>,
    pub start_time: Option<String>,
    /// Pod phase, or the waiting reason of a container that is not running
    pub state: String,
    pub ready: bool,
    pub image: String,
    pub restart_count: i32,
    pub version: i64,
    pub process_type: String,
    pub namespace: String,
}

impl Instance {
    /// `None` for pods that do not belong to a process
    pub fn from_pod(obj: &DynamicObject) -> Result<Option<Self>> {
        let pod: Pod = from_dynamic(obj)?;
        let labels = pod.metadata.labels.clone().unwrap_or_default();
        let Some(process_type) = labels.get(PROCESS_NAME).cloned() else {
            return Ok(None);
        };
        let version = labels
            .get(REVISION)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let status = pod.status.unwrap_or_default();
        let containers = status.container_statuses.unwrap_or_default();
        let waiting = containers
            .iter()
            .filter_map(|c| c.state.as_ref()?.waiting.as_ref()?.reason.clone())
            .next();
        let ready = status
            .conditions
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");
        let image = pod
            .spec
            .and_then(|s| s.containers.into_iter().next())
            .and_then(|c| c.image)
            .unwrap_or_default();

        Ok(Some(Self {
            name: pod.metadata.name.unwrap_or_default(),
            host_ip: status.host_ip,
            start_time: status.start_time.map(|t| t.0.to_rfc3339()),
            state: waiting
                .or(status.phase)
                .unwrap_or_else(|| "Unknown".to_string()),
            ready,
            image,
            restart_count: containers.iter().map(|c| c.restart_count).sum(),
            version,
            process_type,
            namespace: pod.metadata.namespace.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_waiting_reason_overrides_phase() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-1",
                "namespace": "bkapp-demo-stag",
                "labels": {PROCESS_NAME: "web", REVISION: "4"}
            },
            "spec": {"containers": [{"name": "web", "image": "registry.local/demo:v1"}]},
            "status": {
                "phase": "Running",
                "hostIP": "10.0.0.1",
                "conditions": [{"type": "Ready", "status": "False"}],
                "containerStatuses": [{
                    "name": "web", "image": "registry.local/demo:v1", "imageID": "",
                    "ready": false, "restartCount": 3,
                    "state": {"waiting": {"reason": "CrashLoopBackOff"}}
                }]
            }
        }))
        .unwrap();
        let inst = Instance::from_pod(&obj).unwrap().unwrap();
        assert_eq!(inst.state, "CrashLoopBackOff");
        assert!(!inst.ready);
        assert_eq!(inst.restart_count, 3);
        assert_eq!(inst.version, 4);
        assert_eq!(inst.process_type, "web");
        assert_eq!(inst.host_ip.as_deref(), Some("10.0.0.1"));
    }
}
