//! # Resource Entities
//!
//! Typed entities for every kind the deployment core owns, each with a pure
//! serializer into a [`DynamicObject`] and a deserializer back.
//!
//! ## Conventions
//!
//! - Serializers carry `metadata.resourceVersion` over from the original
//!   object so replaces are optimistic-concurrency safe
//! - Deserializers ignore fields they do not know
//! - Owned objects always carry the contractual labels from [`labels`]

pub mod config_map;
pub mod custom;
pub mod deployment;
pub mod gpa;
pub mod image_credentials;
pub mod ingress;
pub mod kind;
pub mod labels;
pub mod pvc;
pub mod secret;
pub mod service;
pub mod service_monitor;

pub use config_map::ConfigMapEntity;
pub use deployment::DeploymentEntity;
pub use gpa::GpaEntity;
pub use image_credentials::{ImageCredential, ImageCredentialsEntity};
pub use ingress::{IngressEntity, IngressPath, IngressRule};
pub use kind::Kind;
pub use pvc::PvcEntity;
pub use secret::SecretEntity;
pub use service::{ServiceEntity, ServicePort};
pub use service_monitor::{MonitorEndpoint, ServiceMonitorEntity};

use crate::backoff::FibonacciBackoff;
use crate::cluster::ClusterGateway;
use crate::error::{Error, Result};
use crate::model::Cluster;
use crate::observability::metrics;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An owned Kubernetes object with a typed representation
pub trait ResourceEntity: Sized + Send + Sync {
    const KIND: Kind;

    fn name(&self) -> &str;

    /// Render the object; `original` is the live object when one exists
    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject>;

    fn deserialize(obj: &DynamicObject) -> Result<Self>;
}

pub fn object_meta(
    name: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: (!labels.is_empty()).then(|| labels.clone()),
        annotations: (!annotations.is_empty()).then(|| annotations.clone()),
        ..ObjectMeta::default()
    }
}

/// Convert a typed object into a [`DynamicObject`] of `kind`
pub fn to_dynamic<T: Serialize>(kind: Kind, value: &T) -> Result<DynamicObject> {
    let mut json = serde_json::to_value(value)?;
    if let Some(map) = json.as_object_mut() {
        map.insert("apiVersion".to_string(), kind.api_version().into());
        map.insert("kind".to_string(), kind.wire_kind().into());
    }
    Ok(serde_json::from_value(json)?)
}

/// Convert a [`DynamicObject`] into a typed object
pub fn from_dynamic<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Copy `metadata.resourceVersion` from the live object
pub fn preserve_resource_version(obj: &mut DynamicObject, original: Option<&DynamicObject>) {
    if let Some(rv) = original.and_then(|o| o.metadata.resource_version.clone()) {
        obj.metadata.resource_version = Some(rv);
    }
}

pub fn labels_of(obj: &DynamicObject) -> BTreeMap<String, String> {
    obj.metadata.labels.clone().unwrap_or_default()
}

pub fn annotations_of(obj: &DynamicObject) -> BTreeMap<String, String> {
    obj.metadata.annotations.clone().unwrap_or_default()
}

/// Create or update `entity`, re-reading the live object on every attempt.
///
/// A 409 Conflict is retried with a Fibonacci backoff; when `max_retries`
/// attempts all conflict the call fails with [`Error::ConflictOnApply`].
pub async fn create_or_update<E: ResourceEntity>(
    gateway: &dyn ClusterGateway,
    cluster: &Cluster,
    namespace: &str,
    entity: &E,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<DynamicObject> {
    let attempts = max_retries.max(1);
    let mut backoff = FibonacciBackoff::new(backoff_ms, backoff_ms.saturating_mul(10));

    for attempt in 1..=attempts {
        let original = gateway
            .get(cluster, E::KIND, namespace, entity.name())
            .await?;
        let obj = entity.serialize(original.as_ref())?;

        match gateway.apply(cluster, E::KIND, namespace, obj).await {
            Ok(applied) => {
                debug!(
                    kind = %E::KIND,
                    name = entity.name(),
                    namespace = namespace,
                    attempt = attempt,
                    "Applied resource"
                );
                return Ok(applied);
            }
            Err(e) if e.is_conflict() => {
                metrics::increment_apply_conflicts();
                warn!(
                    kind = %E::KIND,
                    name = entity.name(),
                    attempt = attempt,
                    "Conflict while applying resource, retrying"
                );
                if attempt < attempts {
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::ConflictOnApply {
        kind: E::KIND.to_string(),
        name: entity.name().to_string(),
        attempts,
    })
}

/// Delete `name` of `E::KIND`; a missing object counts as deleted
pub async fn delete_if_exists<E: ResourceEntity>(
    gateway: &dyn ClusterGateway,
    cluster: &Cluster,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    gateway.delete(cluster, E::KIND, namespace, name).await
}
