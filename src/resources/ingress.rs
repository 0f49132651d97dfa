//! Ingress entity.
//!
//! Ingresses are rendered by the operator from the DomainGroupMapping; the
//! deployer produces the same objects for previews.

use super::{
    annotations_of, from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind,
    ResourceEntity,
};
use crate::error::Result;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule as K8sIngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressPath {
    pub path: String,
    pub service_name: String,
    pub service_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressRule {
    pub host: String,
    pub paths: Vec<IngressPath>,
    /// Empty when the host is served over plain HTTP
    pub tls_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub rules: Vec<IngressRule>,
}

impl ResourceEntity for IngressEntity {
    const KIND: Kind = Kind::Ingress;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let rules = self
            .rules
            .iter()
            .map(|rule| K8sIngressRule {
                host: Some(rule.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: rule
                        .paths
                        .iter()
                        .map(|p| HTTPIngressPath {
                            path: Some(p.path.clone()),
                            path_type: "ImplementationSpecific".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: p.service_name.clone(),
                                    port: Some(ServiceBackendPort {
                                        name: Some(p.service_port.clone()),
                                        number: None,
                                    }),
                                }),
                                resource: None,
                            },
                        })
                        .collect(),
                }),
            })
            .collect();

        let tls: Vec<IngressTLS> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.tls_secret_name.as_ref().map(|secret| IngressTLS {
                    hosts: Some(vec![rule.host.clone()]),
                    secret_name: (!secret.is_empty()).then(|| secret.clone()),
                })
            })
            .collect();

        let ingress = Ingress {
            metadata: object_meta(&self.name, &self.labels, &self.annotations),
            spec: Some(IngressSpec {
                rules: Some(rules),
                tls: (!tls.is_empty()).then_some(tls),
                ..IngressSpec::default()
            }),
            ..Ingress::default()
        };

        let mut obj = to_dynamic(Self::KIND, &ingress)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let ingress: Ingress = from_dynamic(obj)?;
        let spec = ingress.spec.unwrap_or_default();
        let tls = spec.tls.unwrap_or_default();

        let rules = spec
            .rules
            .unwrap_or_default()
            .into_iter()
            .map(|rule| {
                let host = rule.host.unwrap_or_default();
                let tls_secret_name = tls
                    .iter()
                    .find(|t| t.hosts.as_ref().is_some_and(|h| h.contains(&host)))
                    .map(|t| t.secret_name.clone().unwrap_or_default());
                let paths = rule
                    .http
                    .map(|http| http.paths)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| {
                        let service = p.backend.service.unwrap_or_default();
                        IngressPath {
                            path: p.path.unwrap_or_else(|| "/".to_string()),
                            service_name: service.name,
                            service_port: service
                                .port
                                .and_then(|port| {
                                    port.name.or_else(|| port.number.map(|n| n.to_string()))
                                })
                                .unwrap_or_default(),
                        }
                    })
                    .collect();
                IngressRule {
                    host,
                    paths,
                    tls_secret_name,
                }
            })
            .collect();

        Ok(Self {
            name: ingress.metadata.name.unwrap_or_default(),
            labels: ingress.metadata.labels.unwrap_or_default(),
            annotations: annotations_of(obj),
            rules,
        })
    }
}
