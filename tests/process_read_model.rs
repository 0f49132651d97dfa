//! Process listing and watching over the in-memory gateway

mod common;

use cnative_deployer::model::EnvName;
use cnative_deployer::processes::{ProcessReadModel, WatchMessage};
use cnative_deployer::resources::labels::{process_labels, REVISION};
use cnative_deployer::resources::{DeploymentEntity, Kind, ResourceEntity};
use common::{World, APP_CODE, IMAGE};
use kube::api::DynamicObject;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

fn deployment(process: &str, replicas: i32) -> DynamicObject {
    let labels = process_labels(APP_CODE, "default", EnvName::Stag, process);
    DeploymentEntity {
        name: format!("{APP_CODE}--{process}"),
        labels: labels.clone(),
        annotations: BTreeMap::from([(REVISION.to_string(), "2".to_string())]),
        replicas,
        image: IMAGE.to_string(),
        command: vec!["gunicorn".to_string()],
        args: vec!["app:wsgi".to_string()],
        pod_labels: labels,
        resource_version: None,
    }
    .serialize(None)
    .unwrap()
}

fn pod(name: &str, process: &str, ready: bool) -> DynamicObject {
    let mut labels = process_labels(APP_CODE, "default", EnvName::Stag, process);
    labels.insert(REVISION.to_string(), "2".to_string());
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "labels": labels},
        "spec": {"containers": [{"name": process, "image": IMAGE}]},
        "status": {
            "phase": "Running",
            "conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}]
        }
    }))
    .unwrap()
}

async fn next(rx: &mut mpsc::Receiver<WatchMessage>) -> WatchMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watch message in time")
        .expect("watch channel open")
}

#[tokio::test]
async fn test_list_groups_instances_by_process() {
    let world = World::new().await;
    let target = world.target(EnvName::Stag).await;
    let ns = &target.namespace;
    world.gateway.insert(&world.cluster, Kind::Deployment, ns, deployment("web", 2));
    world.gateway.insert(&world.cluster, Kind::Deployment, ns, deployment("worker", 1));
    world.gateway.insert(&world.cluster, Kind::Pod, ns, pod("demo--web-b", "web", true));
    world.gateway.insert(&world.cluster, Kind::Pod, ns, pod("demo--web-a", "web", false));
    world.gateway.insert(&world.cluster, Kind::Pod, ns, pod("demo--beat-a", "beat", true));

    let model = ProcessReadModel::new(world.gateway.clone(), world.settings.clone());
    let snapshot = model.list(&target).await.unwrap();

    let names: Vec<_> = snapshot.processes.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["web", "worker"]);
    let web = &snapshot.processes[0];
    assert_eq!(web.replicas, 2);
    assert_eq!(web.version, 2);
    assert_eq!(web.command, "gunicorn app:wsgi");
    let instances: Vec<_> = web.instances.iter().map(|i| (i.name.as_str(), i.ready)).collect();
    assert_eq!(instances, [("demo--web-a", false), ("demo--web-b", true)]);
    assert!(snapshot.processes[1].instances.is_empty());

    assert_eq!(snapshot.orphan_instances.len(), 1);
    assert_eq!(snapshot.orphan_instances[0].process_type, "beat");
    assert_eq!(snapshot.instances().count(), 3);
    assert!(!snapshot.rv_inst.is_empty());
}

#[tokio::test]
async fn test_list_ignores_other_environments() {
    let world = World::new().await;
    let stag = world.target(EnvName::Stag).await;
    let prod = world.target(EnvName::Prod).await;
    world
        .gateway
        .insert(&world.cluster, Kind::Deployment, &stag.namespace, deployment("web", 1));

    let model = ProcessReadModel::new(world.gateway.clone(), world.settings.clone());
    assert!(model.list(&prod).await.unwrap().processes.is_empty());
}

#[tokio::test]
async fn test_watch_streams_changes_until_closed() {
    let world = World::new().await;
    let target = world.target(EnvName::Stag).await;
    let model = ProcessReadModel::new(world.gateway.clone(), world.settings.clone());
    let snapshot = model.list(&target).await.unwrap();

    let mut rx = model
        .watch(&target, Duration::from_secs(60), &snapshot.rv_proc, &snapshot.rv_inst)
        .await
        .unwrap();
    assert_eq!(next(&mut rx).await, WatchMessage::Ping);

    world
        .gateway
        .insert(&world.cluster, Kind::Pod, &target.namespace, pod("demo--web-a", "web", true));
    let WatchMessage::Instance { type_, instance } = next(&mut rx).await else {
        panic!("expected an instance event");
    };
    assert_eq!(type_, "ADDED");
    assert_eq!(instance.name, "demo--web-a");
    assert_eq!(instance.process_type, "web");

    world
        .gateway
        .insert(&world.cluster, Kind::Deployment, &target.namespace, deployment("web", 3));
    let WatchMessage::Process { type_, process } = next(&mut rx).await else {
        panic!("expected a process event");
    };
    assert_eq!(type_, "ADDED");
    assert_eq!(process.replicas, 3);

    world
        .gateway
        .remove(&world.cluster, Kind::Pod, &target.namespace, "demo--web-a");
    let WatchMessage::Instance { type_, .. } = next(&mut rx).await else {
        panic!("expected an instance event");
    };
    assert_eq!(type_, "DELETED");

    world.gateway.close_watches();
    assert_eq!(next(&mut rx).await, WatchMessage::Eof);
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watch_ends_with_eof_on_timeout() {
    let world = World::new().await;
    let target = world.target(EnvName::Stag).await;
    let model = ProcessReadModel::new(world.gateway.clone(), world.settings.clone());

    let mut rx = model
        .watch(&target, Duration::from_secs(90), "0", "0")
        .await
        .unwrap();

    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }
    assert_eq!(messages.first(), Some(&WatchMessage::Ping));
    assert_eq!(messages.last(), Some(&WatchMessage::Eof));
    assert!(messages[..messages.len() - 1]
        .iter()
        .all(|m| *m == WatchMessage::Ping));
}

#[tokio::test]
async fn test_watch_resumes_from_listed_versions() {
    let world = World::new().await;
    let target = world.target(EnvName::Stag).await;
    let ns = &target.namespace;
    world.gateway.insert(&world.cluster, Kind::Pod, ns, pod("demo--web-old", "web", true));
    let model = ProcessReadModel::new(world.gateway.clone(), world.settings.clone());
    let snapshot = model.list(&target).await.unwrap();

    // Changes between list and watch are not lost
    world.gateway.insert(&world.cluster, Kind::Pod, ns, pod("demo--web-new", "web", false));

    let mut rx = model
        .watch(&target, Duration::from_secs(60), &snapshot.rv_proc, &snapshot.rv_inst)
        .await
        .unwrap();
    assert_eq!(next(&mut rx).await, WatchMessage::Ping);
    let WatchMessage::Instance { type_, instance } = next(&mut rx).await else {
        panic!("expected an instance event");
    };
    assert_eq!(type_, "ADDED");
    assert_eq!(instance.name, "demo--web-new");

    world.gateway.close_watches();
    assert_eq!(next(&mut rx).await, WatchMessage::Eof);
}
