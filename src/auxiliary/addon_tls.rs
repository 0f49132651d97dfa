//! TLS material of enhanced services as `kubernetes.io/tls` Secrets.
//!
//! Workloads mount `bkapp-addon-{provider}-tls` to talk to services that
//! require client certificates.

use crate::cluster::ClusterGateway;
use crate::error::Result;
use crate::model::{EnvTarget, ServiceInstanceBinding};
use crate::resources::{self, labels, SecretEntity};
use tracing::info;

/// Secret name for a provider; `_` is not allowed in object names
pub fn secret_name(provider: &str) -> String {
    format!("bkapp-addon-{}-tls", provider.to_lowercase().replace('_', "-"))
}

/// One Secret per binding whose plan carries TLS material
pub fn build_secrets(target: &EnvTarget, bindings: &[ServiceInstanceBinding]) -> Vec<SecretEntity> {
    let labels = labels::app_labels(
        &target.application.code,
        &target.module.name,
        target.environment,
    );
    let mut secrets: Vec<SecretEntity> = bindings
        .iter()
        .filter_map(|b| {
            let tls = b.tls.as_ref()?;
            Some(SecretEntity::tls(
                &secret_name(&b.service_name),
                labels.clone(),
                &tls.cert,
                &tls.key,
                tls.ca.as_deref(),
            ))
        })
        .collect();
    secrets.sort_by(|a, b| a.name.cmp(&b.name));
    secrets.dedup_by(|a, b| a.name == b.name);
    secrets
}

/// Apply the addon TLS Secrets; returns their names
pub async fn reconcile(
    gateway: &dyn ClusterGateway,
    target: &EnvTarget,
    bindings: &[ServiceInstanceBinding],
    max_retries: u32,
    backoff_ms: u64,
) -> Result<Vec<String>> {
    let secrets = build_secrets(target, bindings);
    for secret in &secrets {
        resources::create_or_update(
            gateway,
            &target.cluster,
            &target.namespace,
            secret,
            max_retries,
            backoff_ms,
        )
        .await?;
        info!(secret = %secret.name, "Applied addon TLS secret");
    }
    Ok(secrets.into_iter().map(|s| s.name).collect())
}
