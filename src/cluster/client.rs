//! # Client Factory
//!
//! Builds authenticated clients for a registered cluster. API servers are
//! tried in their configured order; the first one that answers a version
//! request wins and is cached for a short while. A failing endpoint evicts the
//! cache entry so the next call walks the list again.

use crate::error::{Error, Result};
use crate::model::{Cluster, ClusterAuth};
use crate::observability::metrics;
use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Connects to one API server endpoint of a cluster
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    type Client: Clone + Send + Sync + 'static;

    /// Build a client for `endpoint` and check it answers within `deadline`
    async fn connect(
        &self,
        cluster: &Cluster,
        endpoint: &str,
        deadline: Duration,
    ) -> Result<Self::Client>;
}

struct CachedEndpoint<C> {
    endpoint: String,
    client: C,
    selected_at: Instant,
}

/// Picks and caches the responsive endpoint of each cluster
pub struct EndpointSelector<P: EndpointProbe> {
    probe: P,
    ttl: Duration,
    deadline: Duration,
    cache: Mutex<HashMap<String, CachedEndpoint<P::Client>>>,
}

impl<P: EndpointProbe> std::fmt::Debug for EndpointSelector<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSelector")
            .field("ttl", &self.ttl)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<P: EndpointProbe> EndpointSelector<P> {
    pub fn new(probe: P, ttl: Duration, deadline: Duration) -> Self {
        Self {
            probe,
            ttl,
            deadline,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Endpoint currently cached for `cluster_name`, if still fresh
    pub fn cached_endpoint(&self, cluster_name: &str) -> Option<String> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(cluster_name)
            .filter(|c| c.selected_at.elapsed() < self.ttl)
            .map(|c| c.endpoint.clone())
    }

    pub fn invalidate(&self, cluster_name: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(cluster_name);
        }
    }

    pub async fn client_for(&self, cluster: &Cluster) -> Result<P::Client> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache
                .get(&cluster.name)
                .filter(|c| c.selected_at.elapsed() < self.ttl)
            {
                return Ok(cached.client.clone());
            }
        }

        let mut errors = Vec::new();
        for (idx, endpoint) in cluster.api_servers.iter().enumerate() {
            match self.probe.connect(cluster, endpoint, self.deadline).await {
                Ok(client) => {
                    if idx > 0 {
                        metrics::increment_apiserver_failovers(&cluster.name);
                        info!(
                            cluster.name = %cluster.name,
                            endpoint = %endpoint,
                            "Failed over to API server"
                        );
                    } else {
                        debug!(cluster.name = %cluster.name, endpoint = %endpoint, "Selected API server");
                    }
                    if let Ok(mut cache) = self.cache.lock() {
                        cache.insert(
                            cluster.name.clone(),
                            CachedEndpoint {
                                endpoint: endpoint.clone(),
                                client: client.clone(),
                                selected_at: Instant::now(),
                            },
                        );
                    }
                    return Ok(client);
                }
                Err(e @ Error::ClusterAuth { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        cluster.name = %cluster.name,
                        endpoint = %endpoint,
                        error = %e,
                        "API server did not respond"
                    );
                    errors.push(format!("{endpoint}: {e}"));
                }
            }
        }

        Err(Error::NoReachableApiServer {
            cluster: cluster.name.clone(),
            errors,
        })
    }
}

/// Probe that builds a real [`kube::Client`] and asks for the server version
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeEndpointProbe;

/// Render the kubeconfig of one cluster endpoint.
///
/// Server certificates are always verified: against the cluster CA when one is
/// registered, against the system roots otherwise.
pub fn kubeconfig_for(cluster: &Cluster, endpoint: &str) -> Result<Kubeconfig> {
    let mut cluster_entry = json!({ "server": endpoint });
    if let Some(ca) = cluster.auth.ca_data() {
        cluster_entry["certificate-authority-data"] = json!(ca);
    }

    let user = match &cluster.auth {
        ClusterAuth::Certificate {
            cert_data,
            key_data,
            ..
        } => json!({
            "client-certificate-data": cert_data,
            "client-key-data": key_data,
        }),
        ClusterAuth::Token { token, .. } => json!({ "token": token }),
    };

    let raw = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": cluster.name, "cluster": cluster_entry }],
        "users": [{ "name": cluster.name, "user": user }],
        "contexts": [{
            "name": cluster.name,
            "context": { "cluster": cluster.name, "user": cluster.name }
        }],
        "current-context": cluster.name,
    });

    serde_json::from_value(raw).map_err(|e| Error::ClusterAuth {
        cluster: cluster.name.clone(),
        message: e.to_string(),
    })
}

#[async_trait]
impl EndpointProbe for KubeEndpointProbe {
    type Client = Client;

    async fn connect(&self, cluster: &Cluster, endpoint: &str, deadline: Duration) -> Result<Client> {
        let kubeconfig = kubeconfig_for(cluster, endpoint)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ClusterAuth {
                cluster: cluster.name.clone(),
                message: e.to_string(),
            })?;
        let client = Client::try_from(config)?;

        match tokio::time::timeout(deadline, client.apiserver_version()).await {
            Ok(Ok(info)) => {
                debug!(
                    cluster.name = %cluster.name,
                    endpoint = %endpoint,
                    version = %info.git_version,
                    "API server answered"
                );
                Ok(client)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::Transient(format!(
                "API server {endpoint} did not answer within {}s",
                deadline.as_secs()
            ))),
        }
    }
}
