//! In-memory implementation of every repository trait.
//!
//! Thread-safe using `Arc<RwLock>`; data does not persist across restarts.
//! Queries apply the same ordering a relational backend would use.

use super::{
    AddonStore, ApplicationStore, BuildStore, ClusterStore, CredentialStore, DeployStore,
    DomainStore, EgressStore, RevisionStore, WlAppStore,
};
use crate::error::{Error, Result};
use crate::model::{
    AppDomainCert, AppDomainSharedCert, AppModelDeploy, AppModelRevision, AppUserCredential,
    Application, ArtifactType, Build, Cluster, ClusterAllocationPolicy, Domain, EnvName,
    MarketConfig, Module, ModuleEnv, RCStateAppBinding, RegionClusterState,
    ServiceInstanceBinding, WlApp, WlAppConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    applications: HashMap<Uuid, Application>,
    modules: HashMap<Uuid, Module>,
    module_envs: HashMap<(Uuid, EnvName), ModuleEnv>,
    wl_apps: HashMap<Uuid, WlApp>,
    wl_app_configs: HashMap<Uuid, Vec<WlAppConfig>>,
    clusters: BTreeMap<String, Cluster>,
    policies: HashMap<String, ClusterAllocationPolicy>,
    revisions: BTreeMap<i64, AppModelRevision>,
    deploys: BTreeMap<i64, AppModelDeploy>,
    builds: HashMap<Uuid, Build>,
    domains: BTreeMap<i64, Domain>,
    shared_certs: Vec<AppDomainSharedCert>,
    domain_certs: Vec<AppDomainCert>,
    market_configs: HashMap<Uuid, MarketConfig>,
    credentials: Vec<AppUserCredential>,
    bindings: Vec<ServiceInstanceBinding>,
    cluster_states: BTreeMap<String, RegionClusterState>,
    state_bindings: HashMap<Uuid, RCStateAppBinding>,
    next_id: i64,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_application(&self, application: Application) {
        let mut t = self.tables.write().await;
        t.applications.insert(application.id, application);
    }

    pub async fn insert_module(&self, module: Module) {
        let mut t = self.tables.write().await;
        t.modules.insert(module.id, module);
    }

    /// Register a WlApp with its first Config and bind it to (module, env)
    pub async fn insert_wl_app(&self, module_env: ModuleEnv, wl_app: WlApp, config: WlAppConfig) {
        let mut t = self.tables.write().await;
        t.wl_app_configs.insert(wl_app.uuid, vec![config]);
        t.wl_apps.insert(wl_app.uuid, wl_app);
        t.module_envs
            .insert((module_env.module_id, module_env.environment), module_env);
    }

    pub async fn insert_shared_cert(&self, cert: AppDomainSharedCert) {
        self.tables.write().await.shared_certs.push(cert);
    }

    pub async fn insert_domain_cert(&self, cert: AppDomainCert) {
        self.tables.write().await.domain_certs.push(cert);
    }

    pub async fn insert_market_config(&self, config: MarketConfig) {
        let mut t = self.tables.write().await;
        t.market_configs.insert(config.application_id, config);
    }

    pub async fn insert_credential(&self, credential: AppUserCredential) {
        self.tables.write().await.credentials.push(credential);
    }

    pub async fn insert_binding(&self, binding: ServiceInstanceBinding) {
        self.tables.write().await.bindings.push(binding);
    }

    /// All WlApp Config snapshots, oldest first
    pub async fn config_history(&self, uuid: Uuid) -> Vec<WlAppConfig> {
        self.tables
            .read()
            .await
            .wl_app_configs
            .get(&uuid)
            .cloned()
            .unwrap_or_default()
    }
}

fn not_found(kind: &'static str, key: impl ToString) -> Error {
    Error::NotFound {
        kind,
        key: key.to_string(),
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn get_application(&self, id: Uuid) -> Result<Application> {
        self.tables
            .read()
            .await
            .applications
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("application", id))
    }

    async fn find_application_by_code(&self, code: &str) -> Result<Option<Application>> {
        Ok(self
            .tables
            .read()
            .await
            .applications
            .values()
            .find(|a| a.code == code)
            .cloned())
    }

    async fn get_module(&self, id: Uuid) -> Result<Module> {
        self.tables
            .read()
            .await
            .modules
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("module", id))
    }

    async fn list_modules(&self, application_id: Uuid) -> Result<Vec<Module>> {
        let t = self.tables.read().await;
        let mut modules: Vec<Module> = t
            .modules
            .values()
            .filter(|m| m.application_id == application_id)
            .cloned()
            .collect();
        modules.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.name.cmp(&b.name)));
        Ok(modules)
    }

    async fn get_module_env(&self, module_id: Uuid, env: EnvName) -> Result<ModuleEnv> {
        self.tables
            .read()
            .await
            .module_envs
            .get(&(module_id, env))
            .cloned()
            .ok_or_else(|| not_found("module environment", format!("{module_id}/{env}")))
    }
}

#[async_trait]
impl WlAppStore for MemoryStore {
    async fn get_wl_app(&self, uuid: Uuid) -> Result<WlApp> {
        self.tables
            .read()
            .await
            .wl_apps
            .get(&uuid)
            .cloned()
            .ok_or_else(|| not_found("wl_app", uuid))
    }

    async fn latest_config(&self, uuid: Uuid) -> Result<Option<WlAppConfig>> {
        Ok(self
            .tables
            .read()
            .await
            .wl_app_configs
            .get(&uuid)
            .and_then(|configs| configs.last().cloned()))
    }

    async fn append_config(&self, config: WlAppConfig) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.wl_apps.contains_key(&config.wl_app_uuid) {
            return Err(not_found("wl_app", config.wl_app_uuid));
        }
        t.wl_app_configs
            .entry(config.wl_app_uuid)
            .or_default()
            .push(config);
        Ok(())
    }

    async fn count_wl_apps_on_cluster(&self, cluster: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .await
            .wl_app_configs
            .values()
            .filter_map(|configs| configs.last())
            .filter(|c| c.cluster.as_deref() == Some(cluster))
            .count())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self.tables.read().await.clusters.get(name).cloned())
    }

    async fn list_clusters(&self, tenant_id: &str) -> Result<Vec<Cluster>> {
        Ok(self
            .tables
            .read()
            .await
            .clusters
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn save_cluster(&self, cluster: Cluster) -> Result<()> {
        let mut t = self.tables.write().await;
        t.clusters.insert(cluster.name.clone(), cluster);
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<bool> {
        Ok(self.tables.write().await.clusters.remove(name).is_some())
    }

    async fn get_allocation_policy(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ClusterAllocationPolicy>> {
        Ok(self.tables.read().await.policies.get(tenant_id).cloned())
    }

    async fn save_allocation_policy(
        &self,
        tenant_id: &str,
        policy: ClusterAllocationPolicy,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.policies.insert(tenant_id.to_string(), policy);
        Ok(())
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn insert_revision(&self, mut revision: AppModelRevision) -> Result<AppModelRevision> {
        let mut t = self.tables.write().await;
        let duplicate = t
            .revisions
            .values()
            .any(|r| r.module_id == revision.module_id && r.version == revision.version);
        if duplicate {
            return Err(Error::Conflict(format!(
                "revision v{} already exists for module {}",
                revision.version, revision.module_id
            )));
        }
        revision.id = t.allocate_id();
        t.revisions.insert(revision.id, revision.clone());
        Ok(revision)
    }

    async fn get_revision(&self, id: i64) -> Result<AppModelRevision> {
        self.tables
            .read()
            .await
            .revisions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("revision", id))
    }

    async fn save_revision(&self, revision: &AppModelRevision) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.revisions.get_mut(&revision.id) {
            Some(slot) => {
                *slot = revision.clone();
                Ok(())
            }
            None => Err(not_found("revision", revision.id)),
        }
    }

    async fn max_revision_version(&self, module_id: Uuid) -> Result<u32> {
        Ok(self
            .tables
            .read()
            .await
            .revisions
            .values()
            .filter(|r| r.module_id == module_id)
            .map(|r| r.version)
            .max()
            .unwrap_or(0))
    }
}

#[async_trait]
impl DeployStore for MemoryStore {
    async fn insert_deploy(&self, mut deploy: AppModelDeploy) -> Result<AppModelDeploy> {
        let mut t = self.tables.write().await;
        deploy.id = t.allocate_id();
        t.deploys.insert(deploy.id, deploy.clone());
        Ok(deploy)
    }

    async fn get_deploy(&self, id: i64) -> Result<AppModelDeploy> {
        self.tables
            .read()
            .await
            .deploys
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("deploy", id))
    }

    async fn save_deploy(&self, deploy: &AppModelDeploy) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.deploys.get_mut(&deploy.id) {
            Some(slot) => {
                *slot = deploy.clone();
                Ok(())
            }
            None => Err(not_found("deploy", deploy.id)),
        }
    }

    async fn list_deploys(&self, module_id: Uuid, env: EnvName) -> Result<Vec<AppModelDeploy>> {
        let t = self.tables.read().await;
        let mut deploys: Vec<AppModelDeploy> = t
            .deploys
            .values()
            .filter(|d| d.module_id == module_id && d.environment_name == env)
            .cloned()
            .collect();
        deploys.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(deploys)
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn insert_build(&self, build: Build) -> Result<()> {
        self.tables.write().await.builds.insert(build.uuid, build);
        Ok(())
    }

    async fn get_latest_build(&self, module_id: Uuid) -> Result<Option<Build>> {
        Ok(self
            .tables
            .read()
            .await
            .builds
            .values()
            .filter(|b| b.module_id == module_id)
            .max_by_key(|b| b.created)
            .cloned())
    }

    async fn list_live_image_builds(&self, module_id: Uuid) -> Result<Vec<Build>> {
        let t = self.tables.read().await;
        let mut builds: Vec<Build> = t
            .builds
            .values()
            .filter(|b| {
                b.module_id == module_id
                    && b.artifact_type == ArtifactType::Image
                    && !b.artifact_deleted
                    && b.image.is_some()
            })
            .cloned()
            .collect();
        builds.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(builds)
    }

    async fn mark_artifacts_deleted(&self, uuids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        let mut t = self.tables.write().await;
        let mut updated = 0;
        for uuid in uuids {
            if let Some(build) = t.builds.get_mut(uuid) {
                build.artifact_deleted = true;
                build.updated = at;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn list_custom_domains(&self, module_id: Uuid, env: EnvName) -> Result<Vec<Domain>> {
        Ok(self
            .tables
            .read()
            .await
            .domains
            .values()
            .filter(|d| d.module_id == module_id && d.environment == env)
            .cloned()
            .collect())
    }

    async fn get_custom_domain(&self, id: i64) -> Result<Domain> {
        self.tables
            .read()
            .await
            .domains
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("domain", id))
    }

    async fn insert_custom_domain(&self, mut domain: Domain) -> Result<Domain> {
        let mut t = self.tables.write().await;
        let taken = t.domains.values().any(|d| {
            d.tenant_id == domain.tenant_id
                && d.name == domain.name
                && d.path_prefix == domain.path_prefix
        });
        if taken {
            return Err(Error::Validation(format!(
                "domain {}{} is already in use",
                domain.name, domain.path_prefix
            )));
        }
        domain.id = t.allocate_id();
        t.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    async fn save_custom_domain(&self, domain: &Domain) -> Result<()> {
        let mut t = self.tables.write().await;
        let taken = t.domains.values().any(|d| {
            d.id != domain.id
                && d.tenant_id == domain.tenant_id
                && d.name == domain.name
                && d.path_prefix == domain.path_prefix
        });
        if taken {
            return Err(Error::Validation(format!(
                "domain {}{} is already in use",
                domain.name, domain.path_prefix
            )));
        }
        t.domains.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn delete_custom_domain(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().await.domains.remove(&id).is_some())
    }

    async fn list_shared_certs(&self, tenant_id: &str) -> Result<Vec<AppDomainSharedCert>> {
        Ok(self
            .tables
            .read()
            .await
            .shared_certs
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_domain_cert(&self, tenant_id: &str, name: &str) -> Result<Option<AppDomainCert>> {
        Ok(self
            .tables
            .read()
            .await
            .domain_certs
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.name == name)
            .cloned())
    }

    async fn get_market_config(&self, application_id: Uuid) -> Result<Option<MarketConfig>> {
        Ok(self
            .tables
            .read()
            .await
            .market_configs
            .get(&application_id)
            .cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_credentials(&self, application_id: Uuid) -> Result<Vec<AppUserCredential>> {
        Ok(self
            .tables
            .read()
            .await
            .credentials
            .iter()
            .filter(|c| c.application_id == application_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AddonStore for MemoryStore {
    async fn list_bindings(
        &self,
        module_id: Uuid,
        env: EnvName,
    ) -> Result<Vec<ServiceInstanceBinding>> {
        Ok(self
            .tables
            .read()
            .await
            .bindings
            .iter()
            .filter(|b| b.module_id == module_id && b.environment == env)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EgressStore for MemoryStore {
    async fn save_cluster_state(&self, state: RegionClusterState) -> Result<()> {
        let mut t = self.tables.write().await;
        t.cluster_states.insert(state.name.clone(), state);
        Ok(())
    }

    async fn get_cluster_state(&self, name: &str) -> Result<Option<RegionClusterState>> {
        Ok(self.tables.read().await.cluster_states.get(name).cloned())
    }

    async fn save_state_binding(&self, binding: RCStateAppBinding) -> Result<()> {
        let mut t = self.tables.write().await;
        t.state_bindings.insert(binding.wl_app_uuid, binding);
        Ok(())
    }

    async fn get_state_binding(&self, wl_app_uuid: Uuid) -> Result<Option<RCStateAppBinding>> {
        Ok(self
            .tables
            .read()
            .await
            .state_bindings
            .get(&wl_app_uuid)
            .cloned())
    }

    async fn delete_state_binding(&self, wl_app_uuid: Uuid) -> Result<Option<RCStateAppBinding>> {
        Ok(self.tables.write().await.state_bindings.remove(&wl_app_uuid))
    }
}
