//! # Store
//!
//! Persistence seam of the deployment core.
//!
//! Each record family has its own repository trait so components only depend
//! on what they read. [`Repository`] bundles all of them for wiring; the
//! in-memory [`MemoryStore`] implements every trait and backs tests and
//! single-process deployments.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{
    AppDomainCert, AppDomainSharedCert, AppModelDeploy, AppModelRevision, AppUserCredential,
    Application, Build, Cluster, ClusterAllocationPolicy, Domain, EnvName, MarketConfig, Module,
    ModuleEnv, RCStateAppBinding, RegionClusterState, ServiceInstanceBinding, WlApp, WlAppConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(&self, id: Uuid) -> Result<Application>;
    async fn find_application_by_code(&self, code: &str) -> Result<Option<Application>>;
    async fn get_module(&self, id: Uuid) -> Result<Module>;
    async fn list_modules(&self, application_id: Uuid) -> Result<Vec<Module>>;
    async fn get_module_env(&self, module_id: Uuid, env: EnvName) -> Result<ModuleEnv>;
}

#[async_trait]
pub trait WlAppStore: Send + Sync {
    async fn get_wl_app(&self, uuid: Uuid) -> Result<WlApp>;
    async fn latest_config(&self, uuid: Uuid) -> Result<Option<WlAppConfig>>;
    async fn append_config(&self, config: WlAppConfig) -> Result<()>;
    /// Number of WlApps whose latest Config binds them to `cluster`
    async fn count_wl_apps_on_cluster(&self, cluster: &str) -> Result<usize>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>>;
    async fn list_clusters(&self, tenant_id: &str) -> Result<Vec<Cluster>>;
    async fn save_cluster(&self, cluster: Cluster) -> Result<()>;
    async fn delete_cluster(&self, name: &str) -> Result<bool>;
    async fn get_allocation_policy(&self, tenant_id: &str)
        -> Result<Option<ClusterAllocationPolicy>>;
    async fn save_allocation_policy(
        &self,
        tenant_id: &str,
        policy: ClusterAllocationPolicy,
    ) -> Result<()>;
}

#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Insert a revision; the store assigns `id`
    async fn insert_revision(&self, revision: AppModelRevision) -> Result<AppModelRevision>;
    async fn get_revision(&self, id: i64) -> Result<AppModelRevision>;
    async fn save_revision(&self, revision: &AppModelRevision) -> Result<()>;
    /// Highest version of the module, 0 when it has none
    async fn max_revision_version(&self, module_id: Uuid) -> Result<u32>;
}

#[async_trait]
pub trait DeployStore: Send + Sync {
    /// Insert a deploy; the store assigns `id`
    async fn insert_deploy(&self, deploy: AppModelDeploy) -> Result<AppModelDeploy>;
    async fn get_deploy(&self, id: i64) -> Result<AppModelDeploy>;
    async fn save_deploy(&self, deploy: &AppModelDeploy) -> Result<()>;
    /// Deploys of one environment ordered by `created ASC, id ASC`
    async fn list_deploys(&self, module_id: Uuid, env: EnvName) -> Result<Vec<AppModelDeploy>>;
}

#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn insert_build(&self, build: Build) -> Result<()>;
    async fn get_latest_build(&self, module_id: Uuid) -> Result<Option<Build>>;
    /// Image builds with an image that were not deleted yet, `ORDER BY created DESC`
    async fn list_live_image_builds(&self, module_id: Uuid) -> Result<Vec<Build>>;
    /// Set `artifact_deleted=true, updated=at` on the given builds
    async fn mark_artifacts_deleted(&self, uuids: &[Uuid], at: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn list_custom_domains(&self, module_id: Uuid, env: EnvName) -> Result<Vec<Domain>>;
    async fn get_custom_domain(&self, id: i64) -> Result<Domain>;
    /// Insert a custom domain; fails when (name, path_prefix) is taken
    async fn insert_custom_domain(&self, domain: Domain) -> Result<Domain>;
    /// Insert or replace the row with `domain.id`
    async fn save_custom_domain(&self, domain: &Domain) -> Result<()>;
    async fn delete_custom_domain(&self, id: i64) -> Result<bool>;
    async fn list_shared_certs(&self, tenant_id: &str) -> Result<Vec<AppDomainSharedCert>>;
    async fn get_domain_cert(&self, tenant_id: &str, name: &str) -> Result<Option<AppDomainCert>>;
    async fn get_market_config(&self, application_id: Uuid) -> Result<Option<MarketConfig>>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_credentials(&self, application_id: Uuid) -> Result<Vec<AppUserCredential>>;
}

#[async_trait]
pub trait AddonStore: Send + Sync {
    async fn list_bindings(
        &self,
        module_id: Uuid,
        env: EnvName,
    ) -> Result<Vec<ServiceInstanceBinding>>;
}

#[async_trait]
pub trait EgressStore: Send + Sync {
    async fn save_cluster_state(&self, state: RegionClusterState) -> Result<()>;
    async fn get_cluster_state(&self, name: &str) -> Result<Option<RegionClusterState>>;
    async fn save_state_binding(&self, binding: RCStateAppBinding) -> Result<()>;
    async fn get_state_binding(&self, wl_app_uuid: Uuid) -> Result<Option<RCStateAppBinding>>;
    async fn delete_state_binding(&self, wl_app_uuid: Uuid) -> Result<Option<RCStateAppBinding>>;
}

/// Every repository the deployment core needs
pub trait Repository:
    ApplicationStore
    + WlAppStore
    + ClusterStore
    + RevisionStore
    + DeployStore
    + BuildStore
    + DomainStore
    + CredentialStore
    + AddonStore
    + EgressStore
{
}

impl<T> Repository for T where
    T: ApplicationStore
        + WlAppStore
        + ClusterStore
        + RevisionStore
        + DeployStore
        + BuildStore
        + DomainStore
        + CredentialStore
        + AddonStore
        + EgressStore
{
}

pub type SharedRepository = Arc<dyn Repository>;
