//! End-to-end deploy scenarios
//!
//! Each test drives the deploy controller and the status poller against the
//! in-memory store and gateway, playing the on-cluster operator by writing
//! BkApp status by hand.

mod common;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use cnative_deployer::artifacts::{delete_redundant_images, ImageRef, RegistryApi, RegistryError, RetentionReport};
use cnative_deployer::auxiliary::image_credentials;
use cnative_deployer::cluster::ClusterGateway;
use cnative_deployer::config::Settings;
use cnative_deployer::deploy::env_vars::{BKPAAS_ENVIRONMENT, BKPAAS_SERVICE_ADDRESSES_BKSAAS};
use cnative_deployer::error::Error;
use cnative_deployer::ingress::manager::{SOURCE_SUBDOMAIN, SOURCE_SUBPATH};
use cnative_deployer::ingress::CustomDomainRequest;
use cnative_deployer::model::{deploy, ArtifactType, Build, DeployStatus, EnvName, MarketConfig};
use cnative_deployer::poller::{DeployEvent, ProbeOutcome, PollTask};
use cnative_deployer::resources::labels::{ANNO_ACCESS_CONTROL, ANNO_DEPLOY_ID};
use cnative_deployer::resources::Kind;
use cnative_deployer::runtime::{Components, PostDeployHandler};
use cnative_deployer::store::{
    ApplicationStore, BuildStore, ClusterStore, DeployStore, DomainStore, MemoryStore, RevisionStore,
    SharedRepository,
};
use cnative_deployer::svc_discovery;
use common::{revision_json, status, World, CLUSTER, CREDENTIAL, SUB_PATH_DOMAIN};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const AVAILABLE: (&str, &str, &str) = ("AppAvailable", "True", "AppAvailable");
const PROGRESSING: (&str, &str, &str) = ("AppProgressing", "True", "NewRevision");
const HOOK_FAILED: (&str, &str, &str) = ("HooksFinished", "False", "HookFailed");

fn requeued(outcome: ProbeOutcome) -> PollTask {
    match outcome {
        ProbeOutcome::Requeue(task) => task,
        ProbeOutcome::Finished(status) => panic!("expected requeue, deploy finished as {status}"),
    }
}

fn finished(outcome: ProbeOutcome) -> DeployStatus {
    match outcome {
        ProbeOutcome::Finished(status) => status,
        ProbeOutcome::Requeue(task) => panic!("expected final status, got requeue {task:?}"),
    }
}

/// Deploy a fresh revision to stag and take its first poll task
async fn deployed(world: &mut World) -> (i64, PollTask) {
    let revision = world.create_revision(revision_json(CREDENTIAL)).await;
    let id = world.deploy(EnvName::Stag, revision.id).await.unwrap();
    let task = world.next_task().expect("deploy schedules a probe");
    assert_eq!(task.deploy_id, id);
    (id, task)
}

/// Deploy to stag and let the operator report it available
async fn ready_deploy(world: &mut World) -> i64 {
    let (id, task) = deployed(world).await;
    world.set_status(EnvName::Stag, status("Running", id, &[AVAILABLE])).await;
    assert_eq!(finished(world.probe(task).await), DeployStatus::Ready);
    id
}

#[tokio::test]
async fn test_happy_path_reaches_ready() {
    let mut world = World::new().await;
    let revision = world.create_revision(revision_json(CREDENTIAL)).await;
    assert_eq!(revision.version, 1);
    let mut events = world.events.subscribe();

    let id = world.deploy(EnvName::Stag, revision.id).await.unwrap();
    assert_eq!(world.record(id).await.status, DeployStatus::Pending);

    let target = world.target(EnvName::Stag).await;
    assert!(world.gateway.has_namespace(CLUSTER, &target.namespace));

    let bkapp = world.bkapp(EnvName::Stag).await.expect("BkApp applied");
    let annotations = bkapp.metadata.annotations.clone().unwrap_or_default();
    assert_eq!(annotations.get(ANNO_DEPLOY_ID), Some(&id.to_string()));

    let pull_secret = world
        .gateway
        .get(
            &world.cluster,
            Kind::ImageCredentials,
            &target.namespace,
            &image_credentials::secret_name(&target.bkapp_name),
        )
        .await
        .unwrap();
    assert!(pull_secret.is_some());

    let stored = world.store.get_revision(revision.id).await.unwrap();
    assert!(stored.has_deployed);
    assert!(stored.deployed_value.is_some());

    let module_env = world
        .store
        .get_module_env(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    let history = world.store.config_history(module_env.wl_app_uuid).await;
    let snapshot = history.last().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(snapshot.metadata.bkpaas_deploy_id, Some(id.to_string()));
    assert_eq!(snapshot.cluster.as_deref(), Some(CLUSTER));
    assert_eq!(snapshot.node_selector.get("pool").map(String::as_str), Some("apps"));
    assert_eq!(snapshot.env_vars.get(BKPAAS_ENVIRONMENT).map(String::as_str), Some("stag"));

    // No status yet
    let task = world.next_task().unwrap();
    let task = requeued(world.probe(task).await);
    assert_eq!(world.record(id).await.status, DeployStatus::Pending);

    world.set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING])).await;
    let task = requeued(world.probe(task).await);
    let record = world.record(id).await;
    assert_eq!(record.status, DeployStatus::Progressing);
    assert_eq!(record.reason.as_deref(), Some("NewRevision"));

    world
        .set_status(EnvName::Stag, status("Running", id, &[PROGRESSING, AVAILABLE]))
        .await;
    assert_eq!(finished(world.probe(task).await), DeployStatus::Ready);
    assert_eq!(world.record(id).await.status, DeployStatus::Ready);

    let event = events.try_recv().expect("final status is published");
    let DeployEvent::PostCnativeEnvDeploy { deploy, .. } = &event;
    assert_eq!(deploy.id, id);
    assert_eq!(deploy.status, DeployStatus::Ready);

    let handler = PostDeployHandler::new(world.domains.clone());
    assert!(handler.handle(&event).await.unwrap());
    assert_eq!(world.gateway.applies_of(Kind::DomainGroupMapping), 1);

    let mapping = world.mapping(EnvName::Stag).await.expect("mapping applied");
    let group = |source: &str| {
        mapping
            .spec
            .data
            .iter()
            .find(|g| g.source_type == source)
            .cloned()
            .unwrap_or_else(|| panic!("no {source} group"))
    };
    let subdomains = group(SOURCE_SUBDOMAIN);
    assert_eq!(subdomains.domains.len(), 1);
    assert_eq!(subdomains.domains[0].host, "demo.apps.example.com");
    let subpaths = group(SOURCE_SUBPATH);
    assert_eq!(subpaths.domains.len(), 1);
    assert_eq!(subpaths.domains[0].host, SUB_PATH_DOMAIN);
    assert_eq!(subpaths.domains[0].path_prefix_list.len(), 3);
}

#[tokio::test]
async fn test_missing_image_credential_never_touches_cluster() {
    let mut world = World::new().await;
    let revision = world.create_revision(revision_json("absent")).await;

    let err = world.deploy(EnvName::Stag, revision.id).await.unwrap_err();
    let Error::DeployFailed { deploy_id, source } = err else {
        panic!("expected a recorded deploy failure, got {err:?}");
    };
    assert!(matches!(
        *source,
        Error::InvalidImageCredentials { ref missing } if missing == &["absent".to_string()]
    ));

    let record = world.record(deploy_id).await;
    assert_eq!(record.status, DeployStatus::Error);
    assert_eq!(record.reason.as_deref(), Some(deploy::REASON_INVALID_CREDENTIALS));
    assert!(world.gateway.writes().is_empty());
    assert!(world.next_task().is_none());
    assert!(!world.store.get_revision(revision.id).await.unwrap().has_deployed);
}

#[tokio::test]
async fn test_flapping_condition_is_tolerated() {
    let mut world = World::new().await;
    let (id, mut task) = deployed(&mut world).await;

    // Three hard failures in a row stay within the limit
    world
        .set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING, HOOK_FAILED]))
        .await;
    for expected in 1..=3 {
        task = requeued(world.probe(task).await);
        assert_eq!(task.consecutive_errors, expected);
    }
    assert_eq!(world.record(id).await.status, DeployStatus::Pending);

    world.set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING])).await;
    task = requeued(world.probe(task).await);
    assert_eq!(task.consecutive_errors, 0);
    assert_eq!(world.record(id).await.status, DeployStatus::Progressing);

    // A reason outside the hard set never counts
    world
        .set_status(
            EnvName::Stag,
            status("Pending", id, &[PROGRESSING, ("AppAvailable", "False", "MinimumReplicasUnavailable")]),
        )
        .await;
    task = requeued(world.probe(task).await);
    assert_eq!(task.consecutive_errors, 0);

    world.set_status(EnvName::Stag, status("Running", id, &[AVAILABLE])).await;
    assert_eq!(finished(world.probe(task).await), DeployStatus::Ready);
}

#[tokio::test]
async fn test_persistent_failure_ends_in_error() {
    let mut world = World::new().await;
    let (id, mut task) = deployed(&mut world).await;
    world
        .set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING, HOOK_FAILED]))
        .await;

    for _ in 0..3 {
        task = requeued(world.probe(task).await);
    }
    assert_eq!(finished(world.probe(task).await), DeployStatus::Error);

    let record = world.record(id).await;
    assert_eq!(record.status, DeployStatus::Error);
    assert_eq!(record.reason.as_deref(), Some("HookFailed"));
    assert_eq!(record.message.as_deref(), Some("HooksFinished is False: HookFailed"));
}

#[tokio::test]
async fn test_status_of_previous_deploy_is_ignored() {
    let mut world = World::new().await;
    let (id, task) = deployed(&mut world).await;

    world
        .set_status(EnvName::Stag, status("Running", id - 1, &[AVAILABLE]))
        .await;
    requeued(world.probe(task).await);
    assert_eq!(world.record(id).await.status, DeployStatus::Pending);
}

#[tokio::test]
async fn test_user_interrupt() {
    let mut world = World::new().await;
    let (id, task) = deployed(&mut world).await;
    world.set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING])).await;

    world.deploys.interrupt(id, "wrong image").await.unwrap();
    assert_eq!(finished(world.probe(task).await), DeployStatus::Unknown);

    let record = world.record(id).await;
    assert_eq!(record.reason.as_deref(), Some(deploy::REASON_INTERRUPTED));
    assert_eq!(record.message.as_deref(), Some("wrong image"));
    assert!(matches!(
        world.deploys.interrupt(id, "again").await,
        Err(Error::Conflict(_))
    ));
}

#[tokio::test]
async fn test_new_deploy_supersedes_unfinished_one() {
    let mut world = World::new().await;
    let (first, _) = deployed(&mut world).await;
    let (second, _) = deployed(&mut world).await;

    let older = world.record(first).await;
    assert_eq!(older.status, DeployStatus::Unknown);
    assert_eq!(older.reason.as_deref(), Some(deploy::REASON_SUPERSEDED));
    assert_eq!(world.record(second).await.status, DeployStatus::Pending);
}

#[tokio::test]
async fn test_apply_failure_keeps_api_message() {
    let mut world = World::new().await;
    let message = "admission webhook \"bkapp.validator\" denied the request: replicas out of range";
    world.gateway.inject_apply_error(Kind::BkApp, 422, message);
    let revision = world.create_revision(revision_json(CREDENTIAL)).await;

    let err = world.deploy(EnvName::Stag, revision.id).await.unwrap_err();
    let Error::DeployFailed { deploy_id, .. } = err else {
        panic!("expected a recorded deploy failure, got {err:?}");
    };

    let record = world.record(deploy_id).await;
    assert_eq!(record.status, DeployStatus::Error);
    assert_eq!(record.reason.as_deref(), Some(deploy::REASON_INTERNAL));
    assert_eq!(record.message.as_deref(), Some(message));
    assert!(!world.store.get_revision(revision.id).await.unwrap().has_deployed);
    assert!(world.next_task().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deploy_times_out() {
    let mut world = World::new().await;
    let (id, task) = deployed(&mut world).await;
    world.set_status(EnvName::Stag, status("Pending", id, &[PROGRESSING])).await;
    let task = requeued(world.probe(task).await);

    tokio::time::advance(Duration::from_secs(901)).await;
    assert_eq!(finished(world.probe(task).await), DeployStatus::Error);
    assert_eq!(world.record(id).await.reason.as_deref(), Some(deploy::REASON_TIMEOUT));
}

#[tokio::test]
async fn test_custom_domain_requires_successful_deploy() {
    let mut world = World::new().await;
    let request = CustomDomainRequest {
        host: "WWW.Demo.Example.org".to_string(),
        path_prefix: "/".to_string(),
        https_enabled: false,
        cert_name: None,
    };

    let err = world
        .domains
        .create_custom_domain(world.module.id, EnvName::Stag, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    ready_deploy(&mut world).await;
    let domain = world
        .domains
        .create_custom_domain(world.module.id, EnvName::Stag, request)
        .await
        .unwrap();
    assert_eq!(domain.name, "www.demo.example.org");

    let target = world.target(EnvName::Stag).await;
    let mapping = world
        .gateway
        .get(&world.cluster, Kind::DomainGroupMapping, &target.namespace, &target.bkapp_name)
        .await
        .unwrap()
        .expect("mapping applied");
    assert!(serde_json::to_string(&mapping).unwrap().contains("www.demo.example.org"));

    world
        .store
        .insert_market_config(MarketConfig {
            application_id: world.application.id,
            enabled: true,
            custom_domain_url: Some("http://www.demo.example.org/".to_string()),
        })
        .await;
    assert!(matches!(
        world.domains.delete_custom_domain(domain.id).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_service_discovery_configmap_follows_revision() {
    let mut world = World::new().await;
    let mut manifest = revision_json(CREDENTIAL);
    manifest["spec"]["svcDiscovery"] = json!({"bkSaaS": [{"bkAppCode": "demo"}, {"bkAppCode": "ghost"}]});
    let revision = world.create_revision(manifest).await;
    world.deploy(EnvName::Stag, revision.id).await.unwrap();

    let target = world.target(EnvName::Stag).await;
    let name = svc_discovery::configmap_name(&target.bkapp_name);
    let configmap = world
        .gateway
        .get(&world.cluster, Kind::ConfigMap, &target.namespace, &name)
        .await
        .unwrap();
    assert!(configmap.is_some());

    let module_env = world
        .store
        .get_module_env(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    let history = world.store.config_history(module_env.wl_app_uuid).await;
    assert!(history
        .last()
        .unwrap()
        .env_vars
        .contains_key(BKPAAS_SERVICE_ADDRESSES_BKSAAS));

    let plain = world.create_revision(revision_json(CREDENTIAL)).await;
    world.deploy(EnvName::Stag, plain.id).await.unwrap();
    let configmap = world
        .gateway
        .get(&world.cluster, Kind::ConfigMap, &target.namespace, &name)
        .await
        .unwrap();
    assert!(configmap.is_none());
}

#[derive(Default)]
struct FakeRegistry {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn delete_image(&self, image: &ImageRef) -> Result<(), RegistryError> {
        match image.tag.as_deref() {
            Some("v2") => Err(RegistryError::PermissionDeny(image.to_string())),
            Some("v1") => Err(RegistryError::ResourceNotFound(image.to_string())),
            _ => {
                self.deleted.lock().unwrap().push(image.to_string());
                Ok(())
            }
        }
    }
}

#[tokio::test]
async fn test_image_retention_keeps_newest_builds() {
    let world = World::new().await;
    let now = Utc::now();
    for n in 1..=12 {
        let created = now - ChronoDuration::minutes(60 - n);
        world
            .store
            .insert_build(Build {
                uuid: Uuid::new_v4(),
                application_id: world.application.id,
                module_id: world.module.id,
                image: Some(format!("registry.example.com/demo/web:v{n}")),
                image_repository: Some("registry.example.com/demo/web".to_string()),
                image_tag: Some(format!("v{n}")),
                artifact_type: ArtifactType::Image,
                artifact_deleted: false,
                procfile: BTreeMap::new(),
                owner: "admin".to_string(),
                created,
                updated: created,
            })
            .await
            .unwrap();
    }
    let registry = FakeRegistry::default();

    let report = delete_redundant_images(world.store.as_ref(), &registry, world.module.id, 9)
        .await
        .unwrap();

    // v1 is already gone, v2 is denied, v3 is deleted
    assert_eq!(report, RetentionReport { deleted: 2, failed: 1 });
    assert_eq!(
        *registry.deleted.lock().unwrap(),
        vec!["registry.example.com/demo/web:v3".to_string()]
    );
    let live = world.store.list_live_image_builds(world.module.id).await.unwrap();
    assert_eq!(live.len(), 10);
    assert_eq!(live.first().and_then(|b| b.image_tag.as_deref()), Some("v12"));
    assert_eq!(live.last().and_then(|b| b.image_tag.as_deref()), Some("v2"));
}

#[tokio::test]
async fn test_components_poll_and_sync_domains() {
    let store = Arc::new(MemoryStore::new());
    let seeded = common::seed(&store).await;
    let gateway = Arc::new(cnative_deployer::cluster::InMemoryGateway::new());
    let repo: SharedRepository = store.clone();
    let settings = cnative_deployer::config::create_shared_settings(Settings {
        polling_interval_secs: 0,
        ..Settings::default()
    });
    let components = Components::start(repo, gateway.clone(), settings);

    let revision = components
        .revisions
        .create_revision(seeded.module.id, revision_json(CREDENTIAL), "admin")
        .await
        .unwrap();
    let id = components
        .deploys
        .deploy(seeded.module.id, EnvName::Prod, revision.id, "admin")
        .await
        .unwrap();
    let target = components
        .registry
        .env_target(seeded.module.id, EnvName::Prod)
        .await
        .unwrap();
    gateway
        .set_status(
            &seeded.cluster,
            Kind::BkApp,
            &target.namespace,
            &target.bkapp_name,
            status("Running", id, &[AVAILABLE]),
        )
        .unwrap();

    let mut synced = false;
    for _ in 0..200 {
        let ready = components.store.get_deploy(id).await.unwrap().status == DeployStatus::Ready;
        if ready && gateway.applies_of(Kind::DomainGroupMapping) == 1 {
            synced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(synced, "deploy did not reach ready with domains synced");
    assert!(!components.queue.is_scheduled(id));
    components.shutdown();
}

#[tokio::test]
async fn test_invalid_manifest_never_touches_cluster() {
    let mut world = World::new().await;
    let mut manifest = revision_json(CREDENTIAL);
    manifest["spec"]["processes"][0]["name"] = json!("Web_1");
    let revision = world.create_revision(manifest).await;

    let err = world.deploy(EnvName::Stag, revision.id).await.unwrap_err();
    let Error::DeployFailed { deploy_id, source } = err else {
        panic!("expected a recorded deploy failure, got {err:?}");
    };
    assert!(matches!(*source, Error::Manifest(_)), "{source:?}");

    let record = world.record(deploy_id).await;
    assert_eq!(record.status, DeployStatus::Error);
    assert_eq!(record.reason.as_deref(), Some(deploy::REASON_VALIDATION));
    assert!(world.gateway.writes().is_empty(), "{:?}", world.gateway.writes());
    assert!(world.next_task().is_none());
}

#[tokio::test]
async fn test_redeploy_removes_dropped_sections() {
    let mut world = World::new().await;
    let mut application = world.application.clone();
    application.access_control_enabled = true;
    world.store.insert_application(application.clone()).await;

    let mut manifest = revision_json(CREDENTIAL);
    manifest["spec"]["hooks"] = json!({"preRelease": {"command": ["python"], "args": ["migrate.py"]}});
    manifest["spec"]["domainResolution"] = json!({"nameservers": ["10.0.0.53"]});
    let first = world.create_revision(manifest).await;
    let id = world.deploy(EnvName::Stag, first.id).await.unwrap();
    world.set_status(EnvName::Stag, status("Running", id, &[AVAILABLE])).await;

    let bkapp = world.bkapp(EnvName::Stag).await.unwrap();
    assert!(bkapp.spec.hooks.is_some());
    assert!(bkapp.spec.domain_resolution.is_some());
    let annotations = bkapp.metadata.annotations.unwrap_or_default();
    assert_eq!(annotations.get(ANNO_ACCESS_CONTROL).map(String::as_str), Some("true"));

    application.access_control_enabled = false;
    world.store.insert_application(application).await;
    let second = world.create_revision(revision_json(CREDENTIAL)).await;
    world.deploy(EnvName::Stag, second.id).await.unwrap();

    let bkapp = world.bkapp(EnvName::Stag).await.unwrap();
    assert_eq!(bkapp.spec.hooks, None);
    assert_eq!(bkapp.spec.domain_resolution, None);
    assert!(!bkapp
        .metadata
        .annotations
        .unwrap_or_default()
        .contains_key(ANNO_ACCESS_CONTROL));
    // The operator-owned status survives the update
    assert_eq!(bkapp.status.and_then(|s| s.phase).as_deref(), Some("Running"));
}

#[tokio::test]
async fn test_polling_stops_when_deploy_record_is_gone() {
    let world = World::new().await;
    let target = world.target(EnvName::Stag).await;
    let task = PollTask::new(4242, target);
    assert_eq!(finished(world.probe(task).await), DeployStatus::Unknown);
}

#[tokio::test]
async fn test_failed_mapping_apply_rolls_back_domain_row() {
    let mut world = World::new().await;
    ready_deploy(&mut world).await;
    let request = CustomDomainRequest {
        host: "www.demo.example.org".to_string(),
        path_prefix: "/".to_string(),
        https_enabled: false,
        cert_name: None,
    };

    world
        .gateway
        .inject_apply_error(Kind::DomainGroupMapping, 500, "etcdserver: request timed out");
    let err = world
        .domains
        .create_custom_domain(world.module.id, EnvName::Stag, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { code: 500, .. }), "{err:?}");
    let rows = world
        .store
        .list_custom_domains(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    assert!(rows.is_empty());

    // The retry is not refused as a duplicate
    let domain = world
        .domains
        .create_custom_domain(world.module.id, EnvName::Stag, request)
        .await
        .unwrap();

    world
        .gateway
        .inject_apply_error(Kind::DomainGroupMapping, 500, "etcdserver: request timed out");
    assert!(world.domains.delete_custom_domain(domain.id).await.is_err());
    assert_eq!(world.store.get_custom_domain(domain.id).await.unwrap(), domain);
}

#[tokio::test]
async fn test_domain_mapping_reconcile_is_stable_and_deletes_when_empty() {
    let world = World::new().await;
    let applied = world
        .domains
        .reconcile(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    assert!(applied.is_some());
    let first = world.mapping_object(EnvName::Stag).await.expect("mapping applied");

    world
        .domains
        .reconcile(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    let second = world.mapping_object(EnvName::Stag).await.expect("mapping kept");
    assert_eq!(first.metadata.resource_version, second.metadata.resource_version);

    let mut cluster = world.cluster.clone();
    cluster.ingress_config.app_root_domains.clear();
    cluster.ingress_config.sub_path_domains.clear();
    world.store.save_cluster(cluster).await.unwrap();

    let applied = world
        .domains
        .reconcile(world.module.id, EnvName::Stag)
        .await
        .unwrap();
    assert!(applied.is_none());
    assert!(world.mapping_object(EnvName::Stag).await.is_none());
}
