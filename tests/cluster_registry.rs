//! Cluster registration, deletion guards and environment target resolution

mod common;

use chrono::Utc;
use cnative_deployer::cluster::ClusterRegistry;
use cnative_deployer::error::Error;
use cnative_deployer::model::{
    AllocationPolicy, ClusterAllocationPolicy, EnvName, ModuleEnv, WlApp, WlAppConfig, WlAppMetadata,
    WlAppType,
};
use cnative_deployer::store::{ClusterStore, MemoryStore, SharedRepository};
use common::{cluster, seed, CLUSTER, TENANT};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

fn registry(store: &Arc<MemoryStore>) -> ClusterRegistry {
    let repo: SharedRepository = store.clone();
    ClusterRegistry::new(repo)
}

#[tokio::test]
async fn test_register_validates_and_rejects_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store);

    let mut nameless = cluster();
    nameless.name = "  ".to_string();
    assert!(matches!(
        registry.register_cluster(nameless).await,
        Err(Error::Validation(_))
    ));

    let mut unreachable = cluster();
    unreachable.api_servers.clear();
    assert!(matches!(
        registry.register_cluster(unreachable).await,
        Err(Error::Validation(_))
    ));

    registry.register_cluster(cluster()).await.unwrap();
    assert!(matches!(
        registry.register_cluster(cluster()).await,
        Err(Error::Conflict(_))
    ));
    assert_eq!(registry.get_cluster(CLUSTER).await.unwrap().tenant_id, TENANT);
}

#[tokio::test]
async fn test_update_requires_existing_cluster() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store);
    assert!(matches!(
        registry.update_cluster(cluster()).await,
        Err(Error::ClusterNotFound(_))
    ));

    registry.register_cluster(cluster()).await.unwrap();
    let mut updated = cluster();
    updated.description = "secondary".to_string();
    registry.update_cluster(updated).await.unwrap();
    assert_eq!(registry.get_cluster(CLUSTER).await.unwrap().description, "secondary");
}

#[tokio::test]
async fn test_delete_refuses_cluster_in_use() {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    let registry = registry(&store);

    let err = registry.delete_cluster(CLUSTER).await.unwrap_err();
    let Error::ClusterInUse { cluster, references } = err else {
        panic!("expected the cluster to be in use, got {err:?}");
    };
    assert_eq!(cluster, CLUSTER);
    assert_eq!(references, 2);

    assert!(matches!(
        registry.delete_cluster("nowhere").await,
        Err(Error::ClusterNotFound(_))
    ));
}

#[tokio::test]
async fn test_unbound_app_is_allocated_by_policy() {
    let store = Arc::new(MemoryStore::new());
    let seeded = seed(&store).await;
    let mut other = cluster();
    other.name = "c2".to_string();
    store.save_cluster(other).await.unwrap();
    store
        .save_allocation_policy(
            TENANT,
            ClusterAllocationPolicy::Uniform(AllocationPolicy {
                clusters: vec!["c2".to_string()],
                ..AllocationPolicy::default()
            }),
        )
        .await
        .unwrap();

    let uuid = Uuid::new_v4();
    store
        .insert_wl_app(
            ModuleEnv {
                module_id: Uuid::new_v4(),
                environment: EnvName::Prod,
                wl_app_uuid: uuid,
            },
            WlApp {
                uuid,
                name: "fresh-prod".to_string(),
                namespace: "bkapp-fresh-prod".to_string(),
                app_type: WlAppType::CloudNative,
                tenant_id: TENANT.to_string(),
                region: "default".to_string(),
            },
            WlAppConfig {
                wl_app_uuid: uuid,
                created: Utc::now(),
                env_vars: BTreeMap::new(),
                node_selector: BTreeMap::new(),
                tolerations: vec![],
                cluster: None,
                metadata: WlAppMetadata {
                    paas_app_code: "fresh".to_string(),
                    module_name: "default".to_string(),
                    environment: EnvName::Prod,
                    addons: vec![],
                    bkpaas_deploy_id: None,
                },
            },
        )
        .await;
    let registry = registry(&store);

    assert_eq!(registry.get_cluster_by_app(uuid).await.unwrap().name, "c2");

    // Bound apps keep their cluster whatever the policy says
    let target = registry.env_target(seeded.module.id, EnvName::Stag).await.unwrap();
    assert_eq!(target.cluster.name, CLUSTER);
    assert_eq!(target.bkapp_name, "demo");
    assert_eq!(target.namespace, "bkapp-demo-stag");
}

#[tokio::test]
async fn test_tenant_without_policy_has_no_default_cluster() {
    let store = Arc::new(MemoryStore::new());
    store.save_cluster(cluster()).await.unwrap();
    let uuid = Uuid::new_v4();
    store
        .insert_wl_app(
            ModuleEnv {
                module_id: Uuid::new_v4(),
                environment: EnvName::Stag,
                wl_app_uuid: uuid,
            },
            WlApp {
                uuid,
                name: "lonely-stag".to_string(),
                namespace: "bkapp-lonely-stag".to_string(),
                app_type: WlAppType::CloudNative,
                tenant_id: "t9".to_string(),
                region: "default".to_string(),
            },
            WlAppConfig {
                wl_app_uuid: uuid,
                created: Utc::now(),
                env_vars: BTreeMap::new(),
                node_selector: BTreeMap::new(),
                tolerations: vec![],
                cluster: None,
                metadata: WlAppMetadata {
                    paas_app_code: "lonely".to_string(),
                    module_name: "default".to_string(),
                    environment: EnvName::Stag,
                    addons: vec![],
                    bkpaas_deploy_id: None,
                },
            },
        )
        .await;

    assert!(matches!(
        registry(&store).get_cluster_by_app(uuid).await,
        Err(Error::NoDefaultCluster { .. })
    ));
}
