//! # ConfigMap Watch
//!
//! Watches the settings ConfigMap and hot-reloads [`Settings`].
//!
//! ConfigMap keys may be written either as environment variable names
//! (`METRICS_PORT`) or in lower case (`metrics_port`). Keys missing from the
//! ConfigMap fall back to the process environment, then to defaults.

use super::{Settings, SharedSettings};
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;
use kube_runtime::watcher;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Spawn a watch on `configmap_name` that replaces the shared settings on change
pub fn start_configmap_watch(
    client: kube::Client,
    namespace: &str,
    configmap_name: &str,
    settings: SharedSettings,
) {
    let namespace = namespace.to_string();
    let configmap_name = configmap_name.to_string();
    tokio::spawn(async move {
        let configmaps: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let watcher_config =
            watcher::Config::default().fields(&format!("metadata.name={configmap_name}"));

        info!(
            "Starting watch for settings ConfigMap '{}' in namespace '{}'",
            configmap_name, namespace
        );

        let stream = watcher(configmaps, watcher_config);
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(watcher::Event::Apply(configmap) | watcher::Event::InitApply(configmap)) => {
                    reload_from_configmap(&configmap, &settings).await;
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!(
                        "Settings ConfigMap '{}' was deleted, reverting to environment",
                        configmap_name
                    );
                    reload_from_configmap(&ConfigMap::default(), &settings).await;
                }
                Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                Err(e) => {
                    error!("Error watching settings ConfigMap: {}", e);
                }
            }
        }

        warn!("Settings ConfigMap watch stream ended");
    });
}

/// Rebuild settings from ConfigMap data layered over the process environment
pub async fn reload_from_configmap(configmap: &ConfigMap, settings: &SharedSettings) {
    let overrides: HashMap<String, String> = configmap
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.to_uppercase(), v.clone()))
        .collect();

    let reloaded =
        Settings::from_lookup(|key| overrides.get(key).cloned().or_else(|| std::env::var(key).ok()));

    let mut current = settings.write().await;
    if *current != reloaded {
        info!(
            polling.failure_limits = reloaded.polling_failure_limits,
            polling.interval_secs = reloaded.polling_interval_secs,
            polling.timeout_secs = reloaded.polling_timeout_secs,
            "Settings reloaded"
        );
        *current = reloaded;
    }
}
