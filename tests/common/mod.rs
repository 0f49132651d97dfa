//! Common test utilities for integration and Pact tests
//!
//! Provides rustls initialization and [`World`]: one tenant, one cluster and
//! one application with a default module bound to both environments, all on
//! the in-memory store and gateway.
//!
//! The poll queue receiver stays with the test, so probes run only when a
//! test calls [`World::probe`].

#![allow(dead_code, reason = "each test binary uses a subset of the fixture")]

use chrono::Utc;
use cnative_deployer::cluster::{ClusterRegistry, InMemoryGateway, SharedGateway};
use cnative_deployer::config::{create_shared_settings, Settings, SharedSettings};
use cnative_deployer::crd::{BkApp, DomainGroupMapping};
use kube::api::DynamicObject;
use cnative_deployer::deploy::{DeployController, RevisionService};
use cnative_deployer::ingress::DomainManager;
use cnative_deployer::model::{
    AllocationPolicy, AppModelDeploy, AppModelRevision, AppUserCredential, Application, Cluster,
    ClusterAllocationPolicy, ClusterAuth, DomainConfig, EnvName, EnvTarget, IngressConfig, Module,
    ModuleEnv, WlApp, WlAppConfig, WlAppMetadata, WlAppType,
};
use cnative_deployer::poller::{EventBus, PollQueue, PollTask, ProbeOutcome, StatusPoller};
use cnative_deployer::resources::{Kind, ResourceEntity};
use cnative_deployer::store::{ClusterStore, DeployStore, MemoryStore, SharedRepository};
use cnative_deployer::svc_discovery::{PreallocatedEntranceResolver, SvcDiscoveryProjector};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use tokio::sync::mpsc;
use uuid::Uuid;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it only runs once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const TENANT: &str = "t1";
pub const CLUSTER: &str = "c1";
pub const APP_CODE: &str = "demo";
pub const IMAGE: &str = "registry.example.com/demo/web:v1";
pub const CREDENTIAL: &str = "hub";
pub const SUB_PATH_DOMAIN: &str = "paas.example.com";

pub fn cluster() -> Cluster {
    Cluster {
        name: CLUSTER.to_string(),
        tenant_id: TENANT.to_string(),
        description: "primary".to_string(),
        api_servers: vec!["https://c1.example.com:6443".to_string()],
        auth: ClusterAuth::Token {
            ca_data: None,
            token: "token".to_string(),
        },
        ingress_config: IngressConfig {
            app_root_domains: vec![DomainConfig {
                name: "apps.example.com".to_string(),
                reserved: false,
                https_enabled: false,
            }],
            sub_path_domains: vec![DomainConfig {
                name: SUB_PATH_DOMAIN.to_string(),
                reserved: false,
                https_enabled: false,
            }],
            ..IngressConfig::default()
        },
        default_node_selector: BTreeMap::from([("pool".to_string(), "apps".to_string())]),
        default_tolerations: vec![],
        feature_flags: BTreeMap::new(),
        annotations: BTreeMap::new(),
    }
}

/// Revision manifest with one `web` process and an authenticated image
pub fn revision_json(credential: &str) -> Value {
    json!({
        "spec": {
            "build": {"image": IMAGE, "imageCredentialsName": credential},
            "processes": [
                {"name": "web", "replicas": 1, "command": ["gunicorn"], "args": ["app:wsgi"]}
            ]
        }
    })
}

/// Records every fixture shares
#[derive(Debug, Clone)]
pub struct Seeded {
    pub cluster: Cluster,
    pub application: Application,
    pub module: Module,
}

/// Seed tenant `t1`: cluster `c1` as the only allocation target, app `demo`
/// with its default module on both environments, and credential `hub`
pub async fn seed(store: &MemoryStore) -> Seeded {
    let cluster = cluster();
    store.save_cluster(cluster.clone()).await.unwrap();
    store
        .save_allocation_policy(
            TENANT,
            ClusterAllocationPolicy::Uniform(AllocationPolicy {
                clusters: vec![CLUSTER.to_string()],
                ..AllocationPolicy::default()
            }),
        )
        .await
        .unwrap();

    let application = Application {
        id: Uuid::new_v4(),
        code: APP_CODE.to_string(),
        name: "Demo".to_string(),
        tenant_id: TENANT.to_string(),
        region: "default".to_string(),
        secret: "s3cr3t".to_string(),
        access_control_enabled: false,
    };
    let module = Module {
        id: Uuid::new_v4(),
        application_id: application.id,
        name: "default".to_string(),
        is_default: true,
        use_cnb: false,
        log_collector_type: "ELK".to_string(),
    };
    store.insert_application(application.clone()).await;
    store.insert_module(module.clone()).await;

    for env in EnvName::ALL {
        let uuid = Uuid::new_v4();
        store
            .insert_wl_app(
                ModuleEnv {
                    module_id: module.id,
                    environment: env,
                    wl_app_uuid: uuid,
                },
                WlApp {
                    uuid,
                    name: format!("{APP_CODE}-{env}"),
                    namespace: format!("bkapp-{APP_CODE}-{env}"),
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
                    cluster: Some(CLUSTER.to_string()),
                    metadata: WlAppMetadata {
                        paas_app_code: APP_CODE.to_string(),
                        module_name: module.name.clone(),
                        environment: env,
                        addons: vec![],
                        bkpaas_deploy_id: None,
                    },
                },
            )
            .await;
    }
    store
        .insert_credential(AppUserCredential {
            application_id: application.id,
            tenant_id: TENANT.to_string(),
            name: CREDENTIAL.to_string(),
            username: "robot".to_string(),
            password: "hunter2".to_string(),
            description: String::new(),
        })
        .await;

    Seeded {
        cluster,
        application,
        module,
    }
}

pub struct World {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub settings: SharedSettings,
    pub registry: ClusterRegistry,
    pub events: EventBus,
    pub queue: PollQueue,
    pub receiver: mpsc::UnboundedReceiver<PollTask>,
    pub poller: StatusPoller,
    pub deploys: DeployController,
    pub revisions: RevisionService,
    pub domains: DomainManager,
    pub cluster: Cluster,
    pub application: Application,
    pub module: Module,
}

impl World {
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(InMemoryGateway::new());
        let repo: SharedRepository = store.clone();
        let gw: SharedGateway = gateway.clone();
        let settings = create_shared_settings(settings);

        let Seeded {
            cluster,
            application,
            module,
        } = seed(&store).await;

        let registry = ClusterRegistry::new(repo.clone());
        let events = EventBus::new();
        let (queue, receiver) = PollQueue::new();
        let svc_discovery = SvcDiscoveryProjector::new(
            Arc::new(PreallocatedEntranceResolver::new(registry.clone())),
            gw.clone(),
            settings.clone(),
        );
        let deploys = DeployController::new(
            registry.clone(),
            gw.clone(),
            settings.clone(),
            queue.clone(),
            svc_discovery,
        );
        let poller = StatusPoller::new(
            repo.clone(),
            gw.clone(),
            settings.clone(),
            queue.clone(),
            events.clone(),
        );

        Self {
            revisions: RevisionService::new(repo.clone()),
            domains: DomainManager::new(registry.clone(), gw, settings.clone()),
            store,
            gateway,
            settings,
            registry,
            events,
            queue,
            receiver,
            poller,
            deploys,
            cluster,
            application,
            module,
        }
    }

    pub async fn create_revision(&self, json_value: Value) -> AppModelRevision {
        self.revisions
            .create_revision(self.module.id, json_value, "admin")
            .await
            .unwrap()
    }

    pub async fn deploy(&self, env: EnvName, revision_id: i64) -> cnative_deployer::error::Result<i64> {
        self.deploys.deploy(self.module.id, env, revision_id, "admin").await
    }

    pub async fn target(&self, env: EnvName) -> EnvTarget {
        self.registry.env_target(self.module.id, env).await.unwrap()
    }

    pub async fn record(&self, deploy_id: i64) -> AppModelDeploy {
        self.store.get_deploy(deploy_id).await.unwrap()
    }

    /// The task the deploy controller or the last requeue scheduled
    pub fn next_task(&mut self) -> Option<PollTask> {
        self.receiver.try_recv().ok()
    }

    /// Run one probe of `task` and hand back what the worker would do next
    pub async fn probe(&self, task: PollTask) -> ProbeOutcome {
        self.poller.probe(task).await
    }

    /// Replace the status the operator reports on the BkApp of `env`
    pub async fn set_status(&self, env: EnvName, status: Value) {
        let target = self.target(env).await;
        self.gateway
            .set_status(
                &self.cluster,
                Kind::BkApp,
                &target.namespace,
                &target.bkapp_name,
                status,
            )
            .unwrap();
    }

    pub async fn mapping_object(&self, env: EnvName) -> Option<DynamicObject> {
        use cnative_deployer::cluster::ClusterGateway;
        let target = self.target(env).await;
        self.gateway
            .get(&self.cluster, Kind::DomainGroupMapping, &target.namespace, &target.bkapp_name)
            .await
            .unwrap()
    }

    pub async fn mapping(&self, env: EnvName) -> Option<DomainGroupMapping> {
        self.mapping_object(env)
            .await
            .map(|obj| DomainGroupMapping::deserialize(&obj).unwrap())
    }

    pub async fn bkapp(&self, env: EnvName) -> Option<BkApp> {
        use cnative_deployer::cluster::ClusterGateway;
        let target = self.target(env).await;
        self.gateway
            .get(&self.cluster, Kind::BkApp, &target.namespace, &target.bkapp_name)
            .await
            .unwrap()
            .map(|obj| BkApp::deserialize(&obj).unwrap())
    }
}

/// A BkApp status for `deploy_id` with the given `(type, status, reason)` conditions
pub fn status(phase: &str, deploy_id: i64, conditions: &[(&str, &str, &str)]) -> Value {
    json!({
        "phase": phase,
        "deployId": deploy_id.to_string(),
        "lastUpdate": Utc::now().to_rfc3339(),
        "conditions": conditions
            .iter()
            .map(|(t, s, r)| json!({"type": t, "status": s, "reason": r, "message": format!("{t} is {s}: {r}")}))
            .collect::<Vec<_>>(),
    })
}
