//! # Service Discovery
//!
//! Materializes the addresses of the peer applications a module declares in
//! `spec.svcDiscovery.bkSaaS` into the ConfigMap `svc-disc-results-{bkapp}`.
//!
//! The payload is a base64 encoded JSON list:
//!
//! ```json
//! [{"key": {"bk_app_code": "peer", "module_name": null},
//!   "value": {"stag_url": "http://peer.stag.example.com/", "prod_url": "http://peer.example.com/"}}]
//! ```
//!
//! Unknown peers keep their entry with a `null` value. The same encoded string
//! is injected as `BKPAAS_SERVICE_ADDRESSES_BKSAAS`.

use crate::cluster::{ClusterRegistry, SharedGateway};
use crate::config::SharedSettings;
use crate::crd::{SvcDiscConfig, SvcDiscEntryBkSaaS};
use crate::error::Result;
use crate::ingress::EnvAddresses;
use crate::model::{EnvName, EnvTarget};
use crate::resources::{self, labels, ConfigMapEntity};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CONFIGMAP_KEY: &str = "bk_saas_encoded_json";

pub fn configmap_name(bkapp_name: &str) -> String {
    format!("svc-disc-results-{bkapp_name}")
}

/// Entrance URL of each environment of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntranceUrls {
    pub stag_url: Option<String>,
    pub prod_url: Option<String>,
}

impl EntranceUrls {
    pub fn get(&self, env: EnvName) -> Option<&str> {
        match env {
            EnvName::Stag => self.stag_url.as_deref(),
            EnvName::Prod => self.prod_url.as_deref(),
        }
    }

    fn set(&mut self, env: EnvName, url: String) {
        match env {
            EnvName::Stag => self.stag_url = Some(url),
            EnvName::Prod => self.prod_url = Some(url),
        }
    }
}

#[derive(Debug, Serialize)]
struct EntryKey<'a> {
    bk_app_code: &'a str,
    module_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    key: EntryKey<'a>,
    value: Option<EntranceUrls>,
}

/// Looks up where a peer application is reachable
#[async_trait]
pub trait EntranceResolver: Send + Sync {
    /// `None` when the application or module does not exist
    async fn resolve(&self, app_code: &str, module_name: Option<&str>) -> Result<Option<EntranceUrls>>;
}

/// Resolves entrances from the generated addresses of the peer's clusters
#[derive(Debug, Clone)]
pub struct PreallocatedEntranceResolver {
    registry: ClusterRegistry,
}

impl PreallocatedEntranceResolver {
    pub fn new(registry: ClusterRegistry) -> Self {
        Self { registry }
    }

    /// Entrance of every environment of `module_id` that is bound to a cluster
    pub async fn module_urls(&self, module_id: Uuid) -> Result<EntranceUrls> {
        let mut urls = EntranceUrls::default();
        for env in EnvName::ALL {
            match self.registry.env_target(module_id, env).await {
                Ok(target) => {
                    if let Some(url) = preferred_url(&target) {
                        urls.set(env, url);
                    }
                }
                Err(e) => debug!(module.id = %module_id, environment = %env, error = %e, "Environment has no entrance"),
            }
        }
        Ok(urls)
    }
}

fn preferred_url(target: &EnvTarget) -> Option<String> {
    EnvAddresses::for_target(target).preferred_url(&target.cluster.ingress_config.port_map)
}

#[async_trait]
impl EntranceResolver for PreallocatedEntranceResolver {
    async fn resolve(&self, app_code: &str, module_name: Option<&str>) -> Result<Option<EntranceUrls>> {
        let store = self.registry.store();
        let Some(application) = store.find_application_by_code(app_code).await? else {
            return Ok(None);
        };
        let module = store
            .list_modules(application.id)
            .await?
            .into_iter()
            .find(|m| match module_name {
                Some(name) => m.name == name,
                None => m.is_default,
            });
        match module {
            Some(m) => Ok(Some(self.module_urls(m.id).await?)),
            None => Ok(None),
        }
    }
}

/// Encode the resolved entries; `None` for an empty list
pub async fn encode_entries(
    resolver: &dyn EntranceResolver,
    entries: &[SvcDiscEntryBkSaaS],
) -> Result<Option<String>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let value = resolver
            .resolve(&entry.bk_app_code, entry.module_name.as_deref())
            .await?;
        if value.is_none() {
            warn!(bk_app_code = %entry.bk_app_code, "Service discovery peer not found");
        }
        items.push(Entry {
            key: EntryKey {
                bk_app_code: &entry.bk_app_code,
                module_name: entry.module_name.as_deref(),
            },
            value,
        });
    }
    Ok(Some(STANDARD.encode(serde_json::to_vec(&items)?)))
}

#[derive(Clone)]
pub struct SvcDiscoveryProjector {
    resolver: Arc<dyn EntranceResolver>,
    gateway: SharedGateway,
    settings: SharedSettings,
}

impl std::fmt::Debug for SvcDiscoveryProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvcDiscoveryProjector").finish_non_exhaustive()
    }
}

impl SvcDiscoveryProjector {
    pub fn new(
        resolver: Arc<dyn EntranceResolver>,
        gateway: SharedGateway,
        settings: SharedSettings,
    ) -> Self {
        Self {
            resolver,
            gateway,
            settings,
        }
    }

    /// Value of `BKPAAS_SERVICE_ADDRESSES_BKSAAS`
    pub async fn encoded_value(&self, config: Option<&SvcDiscConfig>) -> Result<Option<String>> {
        let entries = config.map(|c| c.bk_saas.as_slice()).unwrap_or_default();
        encode_entries(self.resolver.as_ref(), entries).await
    }

    /// Upsert the ConfigMap, or delete it when nothing is declared
    pub async fn reconcile(
        &self,
        target: &EnvTarget,
        config: Option<&SvcDiscConfig>,
    ) -> Result<Option<ConfigMapEntity>> {
        let name = configmap_name(&target.bkapp_name);

        let Some(encoded) = self.encoded_value(config).await? else {
            let deleted = resources::delete_if_exists::<ConfigMapEntity>(
                self.gateway.as_ref(),
                &target.cluster,
                &target.namespace,
                &name,
            )
            .await?;
            if deleted {
                info!(configmap = %name, "Deleted service discovery ConfigMap");
            }
            return Ok(None);
        };

        let entity = ConfigMapEntity {
            name,
            labels: labels::app_labels(
                &target.application.code,
                &target.module.name,
                target.environment,
            ),
            data: BTreeMap::from([(CONFIGMAP_KEY.to_string(), encoded)]),
        };
        let (retries, backoff_ms) = {
            let s = self.settings.read().await;
            (s.apply_conflict_max_retries, s.apply_conflict_backoff_ms)
        };
        resources::create_or_update(
            self.gateway.as_ref(),
            &target.cluster,
            &target.namespace,
            &entity,
            retries,
            backoff_ms,
        )
        .await?;
        info!(configmap = %entity.name, "Applied service discovery ConfigMap");
        Ok(Some(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl EntranceResolver for Fixed {
        async fn resolve(&self, app_code: &str, _module: Option<&str>) -> Result<Option<EntranceUrls>> {
            Ok((app_code == "peer").then(|| EntranceUrls {
                stag_url: Some("http://stag.peer/".to_string()),
                prod_url: Some("http://peer/".to_string()),
            }))
        }
    }

    fn entry(code: &str) -> SvcDiscEntryBkSaaS {
        SvcDiscEntryBkSaaS {
            bk_app_code: code.to_string(),
            module_name: None,
        }
    }

    #[tokio::test]
    async fn test_empty_list_encodes_to_nothing() {
        assert_eq!(encode_entries(&Fixed, &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_peers_keep_null_value() {
        let encoded = encode_entries(&Fixed, &[entry("peer"), entry("ghost")])
            .await
            .unwrap()
            .unwrap();
        let decoded: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded[0]["key"]["bk_app_code"], "peer");
        assert_eq!(decoded[0]["value"]["prod_url"], "http://peer/");
        assert!(decoded[1]["value"].is_null());
    }
}
