//! Clusters and tenant allocation policies.

use crate::model::app::EnvName;
use crate::model::wlapp::Toleration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the deployer authenticates against a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClusterAuth {
    /// PEM client certificate and key
    Certificate {
        ca_data: Option<String>,
        cert_data: String,
        key_data: String,
    },
    /// Bearer token
    Token {
        ca_data: Option<String>,
        token: String,
    },
}

impl ClusterAuth {
    pub fn ca_data(&self) -> Option<&str> {
        match self {
            ClusterAuth::Certificate { ca_data, .. } | ClusterAuth::Token { ca_data, .. } => {
                ca_data.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub https_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMap {
    pub http: u16,
    pub https: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self {
            http: 80,
            https: 443,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default)]
    pub app_root_domains: Vec<DomainConfig>,
    #[serde(default)]
    pub sub_path_domains: Vec<DomainConfig>,
    #[serde(default)]
    pub frontend_ingress_ip: Option<String>,
    #[serde(default)]
    pub port_map: PortMap,
    /// Template such as `{code}.{root}`; empty means the built-in rules apply
    #[serde(default)]
    pub default_ingress_domain_tmpl: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub tenant_id: String,
    pub description: String,
    /// Tried in this order
    pub api_servers: Vec<String>,
    pub auth: ClusterAuth,
    pub ingress_config: IngressConfig,
    pub default_node_selector: BTreeMap<String, String>,
    pub default_tolerations: Vec<Toleration>,
    pub feature_flags: BTreeMap<String, bool>,
    pub annotations: BTreeMap<String, String>,
}

impl Cluster {
    pub fn has_feature(&self, flag: &str) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(false)
    }
}

/// A set of cluster names, optionally split per environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    #[serde(default)]
    pub env_specific: bool,
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub env_clusters: BTreeMap<EnvName, Vec<String>>,
}

/// `matchers` is a map of attribute to required value; empty matches everything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRule {
    #[serde(default)]
    pub matchers: BTreeMap<String, String>,
    pub policy: AllocationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "config")]
pub enum ClusterAllocationPolicy {
    Uniform(AllocationPolicy),
    RuleBased(Vec<AllocationRule>),
}

/// Attributes of the requesting application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationContext {
    pub tenant_id: String,
    pub region: String,
    pub environment: EnvName,
    pub username: Option<String>,
}

impl AllocationContext {
    /// Value of a matcher attribute for this context
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "region" => Some(&self.region),
            "env" | "environment" => Some(self.environment.as_str()),
            "username" => self.username.as_deref(),
            "tenant_id" => Some(&self.tenant_id),
            _ => None,
        }
    }
}
