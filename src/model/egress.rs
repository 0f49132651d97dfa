//! Node snapshots used to pin applications to egress nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the nodes of a cluster at one point in time
///
/// Nodes carrying the label `{name}=1` belong to the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionClusterState {
    pub name: String,
    pub region: String,
    pub cluster_name: String,
    /// Sorted node names
    pub nodes: Vec<String>,
    /// sha256 of the sorted node names
    pub nodes_digest: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RCStateAppBinding {
    pub state_name: String,
    pub wl_app_uuid: Uuid,
    pub created: DateTime<Utc>,
}
