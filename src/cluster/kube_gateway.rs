//! [`ClusterGateway`] backed by the Kubernetes API.

use super::client::{EndpointSelector, KubeEndpointProbe};
use super::gateway::{keep_status, ClusterGateway, ObjectList, RawWatchEvent, WatchEventType};
use crate::constants::DEFAULT_SERVICE_ACCOUNT;
use crate::error::{Error, ErrorKind, Result};
use crate::model::Cluster;
use crate::resources::Kind;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Node, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, WatchEvent,
    WatchParams,
};
use kube::Client;
use std::time::Duration;
use tracing::{debug, info, Instrument};

#[derive(Debug)]
pub struct KubeGateway {
    selector: EndpointSelector<KubeEndpointProbe>,
}

impl KubeGateway {
    pub fn new(cache_ttl: Duration, probe_deadline: Duration) -> Self {
        Self {
            selector: EndpointSelector::new(KubeEndpointProbe, cache_ttl, probe_deadline),
        }
    }

    async fn client(&self, cluster: &Cluster) -> Result<Client> {
        self.selector.client_for(cluster).await
    }

    async fn api(&self, cluster: &Cluster, kind: Kind, namespace: &str) -> Result<Api<DynamicObject>> {
        let client = self.client(cluster).await?;
        let ar = kind.api_resource();
        Ok(if kind.is_namespaced() {
            Api::namespaced_with(client, namespace, &ar)
        } else {
            Api::all_with(client, &ar)
        })
    }

    /// Drop the cached endpoint when a call failed at the transport level
    fn observe<T>(&self, cluster: &Cluster, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Transient {
                self.selector.invalidate(&cluster.name);
            }
        }
        result
    }

    async fn create_if_missing<K>(api: &Api<K>, obj: &K, name: &str) -> Result<()>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
    {
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }
        match api.create(&PostParams::default(), obj).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn ensure_namespace(&self, cluster: &Cluster, namespace: &str) -> Result<()> {
        let result = async {
            let client = self.client(cluster).await?;

            let ns_api: Api<Namespace> = Api::all(client.clone());
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            };
            Self::create_if_missing(&ns_api, &ns, namespace).await?;

            let sa_api: Api<ServiceAccount> = Api::namespaced(client, namespace);
            let sa = ServiceAccount {
                metadata: ObjectMeta {
                    name: Some(DEFAULT_SERVICE_ACCOUNT.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..ObjectMeta::default()
                },
                ..ServiceAccount::default()
            };
            Self::create_if_missing(&sa_api, &sa, DEFAULT_SERVICE_ACCOUNT).await
        }
        .await;
        self.observe(cluster, result)
    }

    async fn get(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let result = async {
            let api = self.api(cluster, kind, namespace).await?;
            Ok(api.get_opt(name).await?)
        }
        .await;
        self.observe(cluster, result)
    }

    async fn apply(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        mut obj: DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let span = tracing::info_span!("apply", kind = %kind, name = %name, namespace = %namespace);

        let result = async {
            let api = self.api(cluster, kind, namespace).await?;
            obj.metadata.namespace = kind.is_namespaced().then(|| namespace.to_string());

            let applied = match api.get_opt(&name).await? {
                None => {
                    info!("Creating resource");
                    api.create(&PostParams::default(), &obj).await?
                }
                Some(existing) => {
                    debug!("Replacing resource");
                    if kind.is_custom() {
                        keep_status(&mut obj, &existing);
                    }
                    if obj.metadata.resource_version.is_none() {
                        obj.metadata.resource_version = existing.metadata.resource_version;
                    }
                    api.replace(&name, &PostParams::default(), &obj).await?
                }
            };
            Ok(applied)
        }
        .instrument(span)
        .await;
        self.observe(cluster, result)
    }

    async fn delete(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let result = async {
            let api = self.api(cluster, kind, namespace).await?;
            match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
                Err(e) => Err(e.into()),
            }
        }
        .await;
        self.observe(cluster, result)
    }

    async fn list(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList> {
        let result = async {
            let api = self.api(cluster, kind, namespace).await?;
            let list = api
                .list(&ListParams::default().labels(label_selector))
                .await?;
            Ok(ObjectList {
                resource_version: list.metadata.resource_version.unwrap_or_default(),
                items: list.items,
            })
        }
        .await;
        self.observe(cluster, result)
    }

    async fn watch(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<RawWatchEvent>>> {
        let api = self.api(cluster, kind, namespace).await?;
        debug!(
            kind = %kind,
            namespace = %namespace,
            resource_version = %resource_version,
            "Opening watch"
        );

        let params = WatchParams::default().labels(label_selector);
        let stream = match api.watch(&params, resource_version).await {
            Ok(stream) => stream,
            Err(e) => return self.observe(cluster, Err(e.into())),
        };
        let stream = stream.filter_map(|event| async move {
            let (type_, object) = match event {
                Ok(WatchEvent::Added(object)) => (WatchEventType::Added, object),
                Ok(WatchEvent::Modified(object)) => (WatchEventType::Modified, object),
                Ok(WatchEvent::Deleted(object)) => (WatchEventType::Deleted, object),
                Ok(WatchEvent::Bookmark(_)) => return None,
                // 410 Gone when the resource version was compacted away
                Ok(WatchEvent::Error(resp)) => {
                    return Some(Err(Error::Api {
                        code: resp.code,
                        reason: resp.reason,
                        message: resp.message,
                    }))
                }
                Err(e) => return Some(Err(Error::Transient(e.to_string()))),
            };
            Some(Ok(RawWatchEvent { type_, object }))
        });
        Ok(stream.boxed())
    }

    async fn list_nodes(&self, cluster: &Cluster) -> Result<Vec<String>> {
        let result = async {
            let api: Api<Node> = Api::all(self.client(cluster).await?);
            let nodes = api.list(&ListParams::default()).await?;
            Ok(nodes
                .items
                .into_iter()
                .filter(|n| {
                    !n.spec
                        .as_ref()
                        .and_then(|s| s.unschedulable)
                        .unwrap_or(false)
                })
                .filter_map(|n| n.metadata.name)
                .collect())
        }
        .await;
        self.observe(cluster, result)
    }

    async fn label_node(
        &self,
        cluster: &Cluster,
        node: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let result = async {
            let api: Api<Node> = Api::all(self.client(cluster).await?);
            let patch = serde_json::json!({ "metadata": { "labels": { key: value } } });
            api.patch(node, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            Ok(())
        }
        .await;
        self.observe(cluster, result)
    }
}
