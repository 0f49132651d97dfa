//! # Clusters
//!
//! Cluster allocation, API-server failover and the gateway every component
//! uses to read and write cluster objects.
//!
//! ## Module Structure
//!
//! - `allocation.rs` - allocation policies to cluster names
//! - `registry.rs` - registered clusters and resolved environment targets
//! - `client.rs` - endpoint selection with caching and failover
//! - `gateway.rs` - the [`ClusterGateway`] seam
//! - `kube_gateway.rs` - Kubernetes API implementation
//! - `fake.rs` - in-memory implementation

pub mod allocation;
pub mod client;
pub mod fake;
pub mod gateway;
pub mod kube_gateway;
pub mod registry;

pub use client::{EndpointProbe, EndpointSelector, KubeEndpointProbe};
pub use fake::{InMemoryGateway, RecordedWrite, WriteOp};
pub use gateway::{ClusterGateway, ObjectList, RawWatchEvent, WatchEventType};
pub use kube_gateway::KubeGateway;
pub use registry::ClusterRegistry;

use std::sync::Arc;

pub type SharedGateway = Arc<dyn ClusterGateway>;
