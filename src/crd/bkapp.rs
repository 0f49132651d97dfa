//! # BkApp
//!
//! Declarative target state of one module environment, reconciled by the
//! on-cluster operator.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: paas.bk.tencent.com/v1alpha2
//! kind: BkApp
//! metadata:
//!   name: demo
//! spec:
//!   build:
//!     image: registry.local/demo:v1
//!   processes:
//!     - name: web
//!       replicas: 1
//!       targetPort: 5000
//!       resQuotaPlan: default
//! ```

use super::status::BkAppStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const BKAPP_GROUP: &str = "paas.bk.tencent.com";
pub const BKAPP_VERSION: &str = "v1alpha2";
pub const BKAPP_API_VERSION: &str = "paas.bk.tencent.com/v1alpha2";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "BkApp",
    group = "paas.bk.tencent.com",
    version = "v1alpha2",
    namespaced,
    status = "BkAppStatus",
    shortname = "bkapp",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"AppAvailable\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BkAppSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BkAppBuildConfig>,
    #[serde(default)]
    pub processes: Vec<BkAppProcess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<BkAppHooks>,
    #[serde(default)]
    pub configuration: BkAppConfiguration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<BkAppAddon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_overlay: Option<EnvOverlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svc_discovery: Option<SvcDiscConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_resolution: Option<DomainResolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<Observability>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BkAppBuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Always, IfNotPresent or Never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_credentials_name: Option<String>,
}

/// Operator-side resource plan; unknown values fail deserialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ResQuotaPlan {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "4C1G")]
    Cpu4Mem1G,
    #[serde(rename = "4C2G")]
    Cpu4Mem2G,
    #[serde(rename = "4C4G")]
    Cpu4Mem4G,
}

impl fmt::Display for ResQuotaPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResQuotaPlan::Default => "default",
            ResQuotaPlan::Cpu4Mem1G => "4C1G",
            ResQuotaPlan::Cpu4Mem2G => "4C2G",
            ResQuotaPlan::Cpu4Mem4G => "4C4G",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BkAppProcess {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res_quota_plan: Option<ResQuotaPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    /// Deprecated per-process image, kept for manifests written before `spec.build`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_credentials_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ProcService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<ProbeSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoscalingSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcService {
    pub name: String,
    pub target_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_type: Option<ExposedType>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ExposedType {
    /// e.g. `bk/http`
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<Probe>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGetAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocketAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,
}

impl Probe {
    /// A probe must declare exactly one handler
    pub fn handler_count(&self) -> usize {
        usize::from(self.exec.is_some())
            + usize::from(self.http_get.is_some())
            + usize::from(self.tcp_socket.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ExecAction {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct HttpGetAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct TcpSocketAction {
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    pub min_replicas: i32,
    pub max_replicas: i32,
    /// Only `default` is known to the operator
    #[serde(default = "default_scaling_policy")]
    pub policy: String,
}

fn default_scaling_policy() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BkAppHooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_release: Option<Hook>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Hook {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct BkAppConfiguration {
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BkAppAddon {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specs: Vec<AddonSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_from: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct AddonSpec {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub name: String,
    pub mount_path: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_storage: Option<PersistentStorageSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ConfigMapSource {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentStorageSource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvOverlay {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicasOverlay>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub res_quotas: Vec<ResQuotaOverlay>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_variables: Vec<EnvVarOverlay>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autoscaling: Vec<AutoscalingOverlay>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountOverlay>,
}

impl EnvOverlay {
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
            && self.res_quotas.is_empty()
            && self.env_variables.is_empty()
            && self.autoscaling.is_empty()
            && self.mounts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicasOverlay {
    pub env_name: String,
    pub process: String,
    pub count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResQuotaOverlay {
    pub env_name: String,
    pub process: String,
    pub plan: ResQuotaPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarOverlay {
    pub env_name: String,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingOverlay {
    pub env_name: String,
    pub process: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default = "default_scaling_policy")]
    pub policy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountOverlay {
    pub env_name: String,
    pub name: String,
    pub mount_path: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SvcDiscConfig {
    #[serde(rename = "bkSaaS", default)]
    pub bk_saas: Vec<SvcDiscEntryBkSaaS>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SvcDiscEntryBkSaaS {
    pub bk_app_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainResolution {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_aliases: Vec<HostAlias>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct HostAlias {
    pub ip: String,
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Observability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Monitoring>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Monitoring {
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub process: String,
    pub service_name: String,
    #[serde(default = "default_metric_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

fn default_metric_path() -> String {
    "/metrics".to_string()
}

impl BkApp {
    /// Every image credential name referenced by the build or any process
    pub fn image_credential_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .spec
            .build
            .iter()
            .filter_map(|b| b.image_credentials_name.clone())
            .chain(
                self.spec
                    .processes
                    .iter()
                    .filter_map(|p| p.image_credentials_name.clone()),
            )
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }
}
