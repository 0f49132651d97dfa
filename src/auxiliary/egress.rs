//! # Egress Binding
//!
//! Pins applications to a fixed subset of nodes so their outbound traffic
//! leaves through known IPs.
//!
//! A [`RegionClusterState`] snapshots the node names of a cluster. Binding an
//! app labels every node of the snapshot with `{state.name}=1` and adds the
//! same pair to the node selector of the app's next Config.

use crate::cluster::{ClusterRegistry, SharedGateway};
use crate::error::{Error, Result};
use crate::model::{RCStateAppBinding, RegionClusterState};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

const STATE_LABEL_VALUE: &str = "1";

/// `eng-cstate-{first 8 hex chars of the digest}`
pub fn state_name(nodes_digest: &str) -> String {
    format!("eng-cstate-{}", &nodes_digest[..nodes_digest.len().min(8)])
}

/// sha256 over the sorted node names, newline separated
pub fn nodes_digest(sorted_nodes: &[String]) -> String {
    format!("{:x}", Sha256::digest(sorted_nodes.join("\n").as_bytes()))
}

#[derive(Clone)]
pub struct EgressBinder {
    registry: ClusterRegistry,
    gateway: SharedGateway,
}

impl std::fmt::Debug for EgressBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressBinder").finish_non_exhaustive()
    }
}

impl EgressBinder {
    pub fn new(registry: ClusterRegistry, gateway: SharedGateway) -> Self {
        Self { registry, gateway }
    }

    /// Snapshot the current nodes of `cluster_name`.
    ///
    /// The same node set always yields the same state, which is reused.
    pub async fn generate_state(&self, cluster_name: &str, region: &str) -> Result<RegionClusterState> {
        let cluster = self.registry.get_cluster(cluster_name).await?;
        let mut nodes = self.gateway.list_nodes(&cluster).await?;
        nodes.sort();
        nodes.dedup();

        let digest = nodes_digest(&nodes);
        let name = state_name(&digest);
        let store = self.registry.store();
        if let Some(existing) = store.get_cluster_state(&name).await? {
            return Ok(existing);
        }

        let state = RegionClusterState {
            name,
            region: region.to_string(),
            cluster_name: cluster.name,
            nodes,
            nodes_digest: digest,
            created: Utc::now(),
        };
        store.save_cluster_state(state.clone()).await?;
        info!(state = %state.name, nodes = state.nodes.len(), "Generated cluster state");
        Ok(state)
    }

    pub async fn bind_app(&self, state_name: &str, wl_app_uuid: Uuid) -> Result<RCStateAppBinding> {
        let span = info_span!("egress.bind", state = state_name, wl_app.uuid = %wl_app_uuid);
        async move {
            let store = self.registry.store();
            let state = store
                .get_cluster_state(state_name)
                .await?
                .ok_or_else(|| Error::NotFound {
                    kind: "RegionClusterState",
                    key: state_name.to_string(),
                })?;

            let cluster = self.registry.get_cluster_by_app(wl_app_uuid).await?;
            if cluster.name != state.cluster_name {
                return Err(Error::Validation(format!(
                    "state {} belongs to cluster {}, app runs on {}",
                    state.name, state.cluster_name, cluster.name
                )));
            }

            for node in &state.nodes {
                self.gateway
                    .label_node(&cluster, node, &state.name, Some(STATE_LABEL_VALUE))
                    .await?;
            }

            let current = store.latest_config(wl_app_uuid).await?.ok_or_else(|| Error::NotFound {
                kind: "WlAppConfig",
                key: wl_app_uuid.to_string(),
            })?;
            let mut config = current.next();
            config
                .node_selector
                .insert(state.name.clone(), STATE_LABEL_VALUE.to_string());
            store.append_config(config).await?;

            let binding = RCStateAppBinding {
                state_name: state.name,
                wl_app_uuid,
                created: Utc::now(),
            };
            store.save_state_binding(binding.clone()).await?;
            info!("Bound app to egress nodes");
            Ok(binding)
        }
        .instrument(span)
        .await
    }

    /// Remove the binding and its node selector; node labels stay for other apps
    pub async fn unbind_app(&self, wl_app_uuid: Uuid) -> Result<bool> {
        let store = self.registry.store();
        let Some(binding) = store.delete_state_binding(wl_app_uuid).await? else {
            return Ok(false);
        };
        if let Some(current) = store.latest_config(wl_app_uuid).await? {
            let mut config = current.next();
            config.node_selector.remove(&binding.state_name);
            store.append_config(config).await?;
        }
        info!(state = %binding.state_name, wl_app.uuid = %wl_app_uuid, "Unbound app from egress nodes");
        Ok(true)
    }
}
