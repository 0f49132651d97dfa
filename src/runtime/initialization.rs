//! # Initialization
//!
//! Daemon startup: rustls provider, tracing, metrics, HTTP server, settings
//! hot-reload and the deployment core itself.

use super::wiring::Components;
use crate::cluster::KubeGateway;
use crate::config::{create_shared_settings, start_configmap_watch, Settings};
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line overrides of [`Settings`]
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub metrics_port: Option<u16>,
    pub log_format: Option<String>,
    pub config_watch: bool,
}

pub struct InitializationResult {
    pub components: Components,
    pub server_state: Arc<ServerState>,
    /// In-cluster client, when one could be built
    pub client: Option<Client>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("in_cluster", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

/// Start the daemon.
///
/// The rustls provider must be installed before any client is built, so it
/// comes first. The HTTP server reports ready only once the poll worker runs.
pub async fn initialize(options: InitOptions) -> Result<InitializationResult> {
    // Fails only when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut settings = Settings::from_env();
    if let Some(port) = options.metrics_port {
        settings.metrics_port = port;
    }
    if let Some(format) = options.log_format {
        settings.log_format = format;
    }

    observability::init_tracing(&settings.log_level, &settings.log_format);
    info!("Starting cnative deployer");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_port = settings.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let gateway = Arc::new(KubeGateway::new(
        settings.cluster_endpoint_cache_ttl(),
        settings.probe_deadline(),
    ));
    let namespace = settings.pod_namespace.clone();
    let configmap_name = settings.settings_configmap_name.clone();
    let shared = create_shared_settings(settings);

    let client = if options.config_watch {
        match Client::try_default().await {
            Ok(client) => {
                start_configmap_watch(client.clone(), &namespace, &configmap_name, Arc::clone(&shared));
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "No in-cluster client, settings hot-reload disabled");
                None
            }
        }
    } else {
        info!("Settings hot-reload disabled");
        None
    };

    let components = Components::start(Arc::new(MemoryStore::new()), gateway, shared);
    server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Deployer initialized");

    Ok(InitializationResult {
        components,
        server_state,
        client,
    })
}
