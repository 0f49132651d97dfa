//! # Kind Registry
//!
//! Every resource kind the deployment core reads or writes, with the API
//! coordinates needed to address it dynamically.

use crate::crd::{BKAPP_GROUP, BKAPP_VERSION};
use crate::error::{Error, Result};
use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Service,
    Deployment,
    Ingress,
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    ServiceMonitor,
    GeneralPodAutoscaler,
    BkApp,
    DomainGroupMapping,
    /// A `kubernetes.io/dockerconfigjson` Secret
    ImageCredentials,
    Pod,
    Node,
    Namespace,
    ServiceAccount,
}

impl Kind {
    pub const ALL: [Kind; 15] = [
        Kind::Service,
        Kind::Deployment,
        Kind::Ingress,
        Kind::ConfigMap,
        Kind::Secret,
        Kind::PersistentVolumeClaim,
        Kind::ServiceMonitor,
        Kind::GeneralPodAutoscaler,
        Kind::BkApp,
        Kind::DomainGroupMapping,
        Kind::ImageCredentials,
        Kind::Pod,
        Kind::Node,
        Kind::Namespace,
        Kind::ServiceAccount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Service => "Service",
            Kind::Deployment => "Deployment",
            Kind::Ingress => "Ingress",
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::PersistentVolumeClaim => "PersistentVolumeClaim",
            Kind::ServiceMonitor => "ServiceMonitor",
            Kind::GeneralPodAutoscaler => "GeneralPodAutoscaler",
            Kind::BkApp => "BkApp",
            Kind::DomainGroupMapping => "DomainGroupMapping",
            Kind::ImageCredentials => "ImageCredentials",
            Kind::Pod => "Pod",
            Kind::Node => "Node",
            Kind::Namespace => "Namespace",
            Kind::ServiceAccount => "ServiceAccount",
        }
    }

    /// (group, version, wire kind, plural)
    fn coordinates(self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            Kind::Service => ("", "v1", "Service", "services"),
            Kind::Deployment => ("apps", "v1", "Deployment", "deployments"),
            Kind::Ingress => ("networking.k8s.io", "v1", "Ingress", "ingresses"),
            Kind::ConfigMap => ("", "v1", "ConfigMap", "configmaps"),
            Kind::Secret | Kind::ImageCredentials => ("", "v1", "Secret", "secrets"),
            Kind::PersistentVolumeClaim => {
                ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims")
            }
            Kind::ServiceMonitor => (
                "monitoring.coreos.com",
                "v1",
                "ServiceMonitor",
                "servicemonitors",
            ),
            Kind::GeneralPodAutoscaler => (
                "autoscaling.tkex.tencent.com",
                "v1alpha1",
                "GeneralPodAutoscaler",
                "generalpodautoscalers",
            ),
            Kind::BkApp => (BKAPP_GROUP, BKAPP_VERSION, "BkApp", "bkapps"),
            Kind::DomainGroupMapping => (
                BKAPP_GROUP,
                "v1alpha1",
                "DomainGroupMapping",
                "domaingroupmappings",
            ),
            Kind::Pod => ("", "v1", "Pod", "pods"),
            Kind::Node => ("", "v1", "Node", "nodes"),
            Kind::Namespace => ("", "v1", "Namespace", "namespaces"),
            Kind::ServiceAccount => ("", "v1", "ServiceAccount", "serviceaccounts"),
        }
    }

    pub fn api_resource(self) -> ApiResource {
        let (group, version, kind, plural) = self.coordinates();
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
    }

    /// `apiVersion` as written into manifests
    pub fn api_version(self) -> String {
        let (group, version, _, _) = self.coordinates();
        if group.is_empty() {
            version.to_string()
        } else {
            format!("{group}/{version}")
        }
    }

    /// Kind as written into manifests
    pub fn wire_kind(self) -> &'static str {
        self.coordinates().2
    }

    /// Custom resources carry an operator-owned status that updates keep
    pub fn is_custom(self) -> bool {
        matches!(
            self,
            Kind::BkApp
                | Kind::DomainGroupMapping
                | Kind::ServiceMonitor
                | Kind::GeneralPodAutoscaler
        )
    }

    pub fn is_namespaced(self) -> bool {
        !matches!(self, Kind::Node | Kind::Namespace)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Validation(format!("unknown resource kind '{s}'")))
    }
}
