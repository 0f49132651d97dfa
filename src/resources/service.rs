//! Service entity for process services.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::api::core::v1::{Service, ServicePort as K8sServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    pub target_port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
    /// Assigned by the API server; never set by the deployer
    pub cluster_ip: Option<String>,
}

impl ResourceEntity for ServiceEntity {
    const KIND: Kind = Kind::Service;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let preserved_ip = original
            .and_then(|o| o.data.pointer("/spec/clusterIP"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let svc = Service {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            spec: Some(ServiceSpec {
                selector: Some(self.selector.clone()),
                ports: Some(
                    self.ports
                        .iter()
                        .map(|p| K8sServicePort {
                            name: Some(p.name.clone()),
                            port: p.port,
                            target_port: Some(IntOrString::Int(p.target_port)),
                            protocol: Some(p.protocol.clone()),
                            ..K8sServicePort::default()
                        })
                        .collect(),
                ),
                cluster_ip: preserved_ip.or_else(|| self.cluster_ip.clone()),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };

        let mut obj = to_dynamic(Self::KIND, &svc)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let svc: Service = from_dynamic(obj)?;
        let spec = svc.spec.unwrap_or_default();
        Ok(Self {
            name: svc.metadata.name.unwrap_or_default(),
            labels: svc.metadata.labels.unwrap_or_default(),
            selector: spec.selector.unwrap_or_default(),
            ports: spec
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| ServicePort {
                    name: p.name.unwrap_or_default(),
                    port: p.port,
                    target_port: match p.target_port {
                        Some(IntOrString::Int(port)) => port,
                        _ => p.port,
                    },
                    protocol: p.protocol.unwrap_or_else(|| "TCP".to_string()),
                })
                .collect(),
            cluster_ip: spec.cluster_ip,
        })
    }
}
