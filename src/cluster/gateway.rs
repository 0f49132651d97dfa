//! # Cluster Gateway
//!
//! The only path by which the deployment core talks to a Kubernetes cluster.
//! Production uses [`super::KubeGateway`]; tests use
//! [`super::InMemoryGateway`].

use crate::error::Result;
use crate::model::Cluster;
use crate::resources::Kind;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::DynamicObject;

/// Result of a list call
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    pub items: Vec<DynamicObject>,
    /// Collection resource version, used to resume a watch
    pub resource_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl WatchEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchEventType::Added => "ADDED",
            WatchEventType::Modified => "MODIFIED",
            WatchEventType::Deleted => "DELETED",
        }
    }
}

/// One change observed on the API server
#[derive(Debug, Clone)]
pub struct RawWatchEvent {
    pub type_: WatchEventType,
    pub object: DynamicObject,
}

/// Copy the live `status` of a custom resource into `obj` before replacing it
pub fn keep_status(obj: &mut DynamicObject, live: &DynamicObject) {
    match (live.data.get("status"), obj.data.as_object_mut()) {
        (Some(status), Some(map)) => {
            map.insert("status".to_string(), status.clone());
        }
        (None, Some(map)) => {
            map.remove("status");
        }
        _ => {}
    }
}

#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create the namespace and its default service account when missing
    async fn ensure_namespace(&self, cluster: &Cluster, namespace: &str) -> Result<()>;

    async fn get(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Create `obj`, or replace it when it exists.
    ///
    /// The stored object becomes exactly `obj`, so fields and annotations it
    /// drops are removed. Custom kinds keep their live `status`. A stale
    /// resource version answers 409 Conflict.
    async fn apply(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        obj: DynamicObject,
    ) -> Result<DynamicObject>;

    /// Returns false when the object did not exist
    async fn delete(&self, cluster: &Cluster, kind: Kind, namespace: &str, name: &str)
        -> Result<bool>;

    async fn list(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList>;

    /// Stream changes after `resource_version`; the stream ends when the server
    /// closes the watch.
    async fn watch(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<RawWatchEvent>>>;

    /// Names of the schedulable nodes
    async fn list_nodes(&self, cluster: &Cluster) -> Result<Vec<String>>;

    /// Set (`Some`) or remove (`None`) a node label
    async fn label_node(
        &self,
        cluster: &Cluster,
        node: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()>;
}
