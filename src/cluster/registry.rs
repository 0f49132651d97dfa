//! # Cluster Registry
//!
//! Registered clusters, their allocation to environments, and the resolved
//! deploy target of a module environment.

use super::allocation::resolve_cluster_name;
use crate::error::{Error, Result};
use crate::manifest::naming::generate_bkapp_name;
use crate::model::{AllocationContext, Cluster, EnvName, EnvTarget};
use crate::store::SharedRepository;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ClusterRegistry {
    store: SharedRepository,
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry").finish_non_exhaustive()
    }
}

impl ClusterRegistry {
    pub fn new(store: SharedRepository) -> Self {
        Self { store }
    }

    pub fn store(&self) -> SharedRepository {
        Arc::clone(&self.store)
    }

    pub async fn get_cluster(&self, name: &str) -> Result<Cluster> {
        self.store
            .get_cluster(name)
            .await?
            .ok_or_else(|| Error::ClusterNotFound(name.to_string()))
    }

    /// Resolve the cluster an environment should be allocated to
    pub async fn resolve_cluster(&self, ctx: &AllocationContext) -> Result<Cluster> {
        let policy = self
            .store
            .get_allocation_policy(&ctx.tenant_id)
            .await?
            .ok_or_else(|| Error::NoDefaultCluster {
                tenant_id: ctx.tenant_id.clone(),
            })?;
        let name = resolve_cluster_name(&policy, ctx)?;
        debug!(
            tenant_id = %ctx.tenant_id,
            environment = %ctx.environment,
            cluster.name = %name,
            "Resolved cluster"
        );
        self.get_cluster(&name).await
    }

    /// Cluster a WlApp is bound to; unbound apps are allocated by policy
    pub async fn get_cluster_by_app(&self, wl_app_uuid: Uuid) -> Result<Cluster> {
        let wl_app = self.store.get_wl_app(wl_app_uuid).await?;
        let config = self.store.latest_config(wl_app_uuid).await?;

        if let Some(name) = config.as_ref().and_then(|c| c.cluster.clone()) {
            return self.get_cluster(&name).await;
        }

        let environment = config
            .map(|c| c.metadata.environment)
            .ok_or_else(|| Error::NotFound {
                kind: "WlAppConfig",
                key: wl_app_uuid.to_string(),
            })?;
        self.resolve_cluster(&AllocationContext {
            tenant_id: wl_app.tenant_id,
            region: wl_app.region,
            environment,
            username: None,
        })
        .await
    }

    pub async fn register_cluster(&self, cluster: Cluster) -> Result<()> {
        validate_cluster(&cluster)?;
        if self.store.get_cluster(&cluster.name).await?.is_some() {
            return Err(Error::Conflict(format!(
                "cluster {} is already registered",
                cluster.name
            )));
        }
        info!(cluster.name = %cluster.name, "Registering cluster");
        self.store.save_cluster(cluster).await
    }

    pub async fn update_cluster(&self, cluster: Cluster) -> Result<()> {
        validate_cluster(&cluster)?;
        self.get_cluster(&cluster.name).await?;
        info!(cluster.name = %cluster.name, "Updating cluster");
        self.store.save_cluster(cluster).await
    }

    /// Delete a cluster no WlApp is bound to
    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        let references = self.store.count_wl_apps_on_cluster(name).await?;
        if references > 0 {
            warn!(cluster.name = %name, references, "Refusing to delete cluster in use");
            return Err(Error::ClusterInUse {
                cluster: name.to_string(),
                references,
            });
        }
        if !self.store.delete_cluster(name).await? {
            return Err(Error::ClusterNotFound(name.to_string()));
        }
        info!(cluster.name = %name, "Deleted cluster");
        Ok(())
    }

    /// Everything needed to address one module environment on its cluster
    pub async fn env_target(&self, module_id: Uuid, environment: EnvName) -> Result<EnvTarget> {
        let module = self.store.get_module(module_id).await?;
        let application = self.store.get_application(module.application_id).await?;
        let module_env = self.store.get_module_env(module_id, environment).await?;
        let wl_app = self.store.get_wl_app(module_env.wl_app_uuid).await?;
        let cluster = self.get_cluster_by_app(wl_app.uuid).await?;

        Ok(EnvTarget {
            bkapp_name: generate_bkapp_name(&application.code, &module.name, module.is_default),
            namespace: wl_app.namespace,
            wl_app_name: wl_app.name,
            application,
            module,
            environment,
            cluster,
        })
    }
}

fn validate_cluster(cluster: &Cluster) -> Result<()> {
    if cluster.name.trim().is_empty() {
        return Err(Error::Validation("cluster name is required".to_string()));
    }
    if cluster.api_servers.is_empty() {
        return Err(Error::Validation(format!(
            "cluster {} needs at least one API server",
            cluster.name
        )));
    }
    Ok(())
}
