//! Registry pull credentials as `kubernetes.io/dockerconfigjson` Secrets.

use crate::artifacts::ImageRef;
use crate::cluster::ClusterGateway;
use crate::crd::BkAppSpec;
use crate::error::{Error, Result};
use crate::model::{AppUserCredential, EnvTarget};
use crate::resources::{self, labels, ImageCredential, ImageCredentialsEntity};
use crate::store::CredentialStore;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

pub fn secret_name(bkapp_name: &str) -> String {
    format!("{bkapp_name}--dockerconfigjson")
}

/// Look up every referenced credential of the application.
///
/// Fails with [`Error::InvalidImageCredentials`] listing all missing names.
pub async fn resolve_credentials(
    store: &dyn CredentialStore,
    application_id: Uuid,
    refs: &[String],
) -> Result<Vec<AppUserCredential>> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }
    let stored: BTreeMap<String, AppUserCredential> = store
        .list_credentials(application_id)
        .await?
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let missing: Vec<String> = refs
        .iter()
        .filter(|r| !stored.contains_key(r.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidImageCredentials { missing });
    }
    Ok(refs.iter().filter_map(|r| stored.get(r).cloned()).collect())
}

/// Registry host each credential name is used against
fn registries_by_credential(spec: &BkAppSpec, fallback_image: Option<&str>) -> Vec<(String, String)> {
    let build = spec.build.as_ref();
    let build_image = build.and_then(|b| b.image.as_deref()).or(fallback_image);

    let mut pairs = Vec::new();
    if let Some(name) = build.and_then(|b| b.image_credentials_name.as_deref()) {
        pairs.push((name, build_image));
    }
    for process in &spec.processes {
        if let Some(name) = process.image_credentials_name.as_deref() {
            pairs.push((name, process.image.as_deref().or(build_image)));
        }
    }

    pairs
        .into_iter()
        .filter_map(|(name, image)| {
            let registry = image.and_then(ImageRef::parse).map(|i| i.registry);
            if registry.is_none() {
                warn!(credential = name, "No image to derive the registry of credential from");
            }
            Some((name.to_string(), registry?))
        })
        .collect()
}

pub fn build_entity(
    target: &EnvTarget,
    spec: &BkAppSpec,
    fallback_image: Option<&str>,
    credentials: &[AppUserCredential],
) -> ImageCredentialsEntity {
    let by_name: BTreeMap<&str, &AppUserCredential> =
        credentials.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut entries: Vec<ImageCredential> = registries_by_credential(spec, fallback_image)
        .into_iter()
        .filter_map(|(name, registry)| {
            by_name.get(name.as_str()).map(|c| ImageCredential {
                registry,
                username: c.username.clone(),
                password: c.password.clone(),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.registry.cmp(&b.registry));
    entries.dedup_by(|a, b| a.registry == b.registry);

    ImageCredentialsEntity {
        name: secret_name(&target.bkapp_name),
        labels: labels::app_labels(
            &target.application.code,
            &target.module.name,
            target.environment,
        ),
        credentials: entries,
    }
}

/// Apply the pull secret, or remove a stale one when nothing is referenced.
///
/// Returns the Secret name when one was applied.
pub async fn reconcile(
    gateway: &dyn ClusterGateway,
    target: &EnvTarget,
    entity: ImageCredentialsEntity,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<Option<String>> {
    if entity.credentials.is_empty() {
        resources::delete_if_exists::<ImageCredentialsEntity>(
            gateway,
            &target.cluster,
            &target.namespace,
            &entity.name,
        )
        .await?;
        return Ok(None);
    }
    resources::create_or_update(
        gateway,
        &target.cluster,
        &target.namespace,
        &entity,
        max_retries,
        backoff_ms,
    )
    .await?;
    info!(secret = %entity.name, registries = entity.credentials.len(), "Applied image credentials");
    Ok(Some(entity.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BkAppBuildConfig, BkAppProcess};
    use crate::store::MemoryStore;

    fn credential(name: &str) -> AppUserCredential {
        AppUserCredential {
            application_id: Uuid::nil(),
            tenant_id: "default".to_string(),
            name: name.to_string(),
            username: format!("{name}-user"),
            password: "secret".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_are_all_listed() {
        let store = MemoryStore::new();
        store.insert_credential(credential("hub")).await;

        let err = resolve_credentials(
            &store,
            Uuid::nil(),
            &["absent".to_string(), "hub".to_string(), "other".to_string()],
        )
        .await
        .unwrap_err();
        match err {
            Error::InvalidImageCredentials { missing } => assert_eq!(missing, vec!["absent", "other"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_process_image_registry_wins_over_build_image() {
        let spec = BkAppSpec {
            build: Some(BkAppBuildConfig {
                image: Some("hub.example.com/team/demo:v1".to_string()),
                image_credentials_name: Some("hub".to_string()),
                ..BkAppBuildConfig::default()
            }),
            processes: vec![BkAppProcess {
                name: "worker".to_string(),
                image: Some("private.example.com/worker:v2".to_string()),
                image_credentials_name: Some("private".to_string()),
                ..BkAppProcess::default()
            }],
            ..BkAppSpec::default()
        };
        let pairs = registries_by_credential(&spec, None);
        assert_eq!(
            pairs,
            vec![
                ("hub".to_string(), "hub.example.com".to_string()),
                ("private".to_string(), "private.example.com".to_string()),
            ]
        );
    }
}
