//! List and watch the processes and instances of one environment.

use super::model::{Instance, Process};
use crate::cluster::{RawWatchEvent, SharedGateway};
use crate::config::SharedSettings;
use crate::error::Result;
use crate::model::EnvTarget;
use crate::observability::metrics;
use crate::resources::{DeploymentEntity, Kind, ResourceEntity};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    /// Processes with their instances attached
    pub processes: Vec<Process>,
    /// Instances whose process has no Deployment (yet)
    pub orphan_instances: Vec<Instance>,
    /// Resource version of the Deployment list
    pub rv_proc: String,
    /// Resource version of the Pod list
    pub rv_inst: String,
}

impl ProcessSnapshot {
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.processes
            .iter()
            .flat_map(|p| p.instances.iter())
            .chain(&self.orphan_instances)
    }
}

/// Messages of a watch stream; always opened by `Ping` and closed by `Eof`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchMessage {
    Ping,
    Process {
        #[serde(rename = "type")]
        type_: &'static str,
        process: Process,
    },
    Instance {
        #[serde(rename = "type")]
        type_: &'static str,
        instance: Instance,
    },
    Error {
        message: String,
    },
    Eof,
}

#[derive(Clone)]
pub struct ProcessReadModel {
    gateway: SharedGateway,
    settings: SharedSettings,
}

impl std::fmt::Debug for ProcessReadModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessReadModel").finish_non_exhaustive()
    }
}

impl ProcessReadModel {
    pub fn new(gateway: SharedGateway, settings: SharedSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn list(&self, target: &EnvTarget) -> Result<ProcessSnapshot> {
        let selector = target.label_selector();
        let deployments = self
            .gateway
            .list(&target.cluster, Kind::Deployment, &target.namespace, &selector)
            .await?;
        let pods = self
            .gateway
            .list(&target.cluster, Kind::Pod, &target.namespace, &selector)
            .await?;

        let mut processes = Vec::new();
        for obj in &deployments.items {
            if let Some(p) = Process::from_deployment(&DeploymentEntity::deserialize(obj)?) {
                processes.push(p);
            }
        }
        processes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut orphan_instances = Vec::new();
        for obj in &pods.items {
            let Some(instance) = Instance::from_pod(obj)? else {
                continue;
            };
            match processes.iter_mut().find(|p| p.name == instance.process_type) {
                Some(p) => p.instances.push(instance),
                None => orphan_instances.push(instance),
            }
        }
        for p in &mut processes {
            p.instances.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(ProcessSnapshot {
            processes,
            orphan_instances,
            rv_proc: deployments.resource_version,
            rv_inst: pods.resource_version,
        })
    }

    /// Stream process and instance changes after the given resource versions.
    ///
    /// Both watches are opened before this returns, so connection errors
    /// surface to the caller. The stream then runs on its own task and ends
    /// with `Eof` on timeout, when the server closes a watch, or when the
    /// receiver is dropped. A `Ping` is sent on every heartbeat interval.
    pub async fn watch(
        &self,
        target: &EnvTarget,
        timeout: Duration,
        rv_proc: &str,
        rv_inst: &str,
    ) -> Result<mpsc::Receiver<WatchMessage>> {
        let selector = target.label_selector();
        let mut proc_stream = self
            .gateway
            .watch(&target.cluster, Kind::Deployment, &target.namespace, &selector, rv_proc)
            .await?;
        let mut inst_stream = self
            .gateway
            .watch(&target.cluster, Kind::Pod, &target.namespace, &selector, rv_inst)
            .await?;

        let (capacity, heartbeat) = {
            let s = self.settings.read().await;
            (s.watch_channel_capacity.max(1), s.watch_heartbeat_interval())
        };
        let (tx, rx) = mpsc::channel(capacity);
        let namespace = target.namespace.clone();

        tokio::spawn(async move {
            metrics::watch_stream_opened();
            info!(namespace = %namespace, "Process watch opened");

            let deadline = Instant::now() + timeout;
            let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);

            if tx.send(WatchMessage::Ping).await.is_ok() {
                loop {
                    let message = tokio::select! {
                        () = sleep_until(deadline) => break,
                        () = tx.closed() => break,
                        _ = ticker.tick() => WatchMessage::Ping,
                        event = proc_stream.next() => match event {
                            Some(Ok(ev)) => match process_message(ev) {
                                Some(m) => m,
                                None => continue,
                            },
                            Some(Err(e)) => WatchMessage::Error { message: e.to_string() },
                            None => break,
                        },
                        event = inst_stream.next() => match event {
                            Some(Ok(ev)) => match instance_message(ev) {
                                Some(m) => m,
                                None => continue,
                            },
                            Some(Err(e)) => WatchMessage::Error { message: e.to_string() },
                            None => break,
                        },
                    };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                // The receiver may already be gone
                let _ = tx.send(WatchMessage::Eof).await;
            }

            metrics::watch_stream_closed();
            info!(namespace = %namespace, "Process watch closed");
        });

        Ok(rx)
    }
}

fn process_message(ev: RawWatchEvent) -> Option<WatchMessage> {
    let entity = match DeploymentEntity::deserialize(&ev.object) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable Deployment event");
            return None;
        }
    };
    let process = Process::from_deployment(&entity)?;
    debug!(process = %process.name, event = ev.type_.as_str(), "Process event");
    Some(WatchMessage::Process {
        type_: ev.type_.as_str(),
        process,
    })
}

fn instance_message(ev: RawWatchEvent) -> Option<WatchMessage> {
    match Instance::from_pod(&ev.object) {
        Ok(Some(instance)) => Some(WatchMessage::Instance {
            type_: ev.type_.as_str(),
            instance,
        }),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable Pod event");
            None
        }
    }
}
