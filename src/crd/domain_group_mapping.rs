//! # DomainGroupMapping
//!
//! Every host and path prefix of one environment, applied as a single object
//! so the operator reconciles Services and Ingresses atomically.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DGM_API_VERSION: &str = "paas.bk.tencent.com/v1alpha1";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "DomainGroupMapping",
    group = "paas.bk.tencent.com",
    version = "v1alpha1",
    namespaced,
    shortname = "dgmapping",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DomainGroupMappingSpec {
    /// The BkApp the domains route to
    pub r#ref: MappingRef,
    #[serde(default)]
    pub data: Vec<DomainGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappingRef {
    pub name: String,
    pub kind: String,
    pub api_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainGroup {
    /// subdomain, subpath or custom
    pub source_type: String,
    pub domains: Vec<DomainEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainEntry {
    pub host: String,
    #[serde(default)]
    pub path_prefix_list: Vec<String>,
    /// Empty or absent means plain HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
}
