//! # Domain Manager
//!
//! Keeps the DomainGroupMapping of an environment in line with its generated
//! addresses and custom domains, and owns the custom domain lifecycle.
//!
//! Every TLS secret a mapping references is written before the mapping itself.

use super::addresses::EnvAddresses;
use super::certs::SharedCertMatcher;
use super::rewrite;
use crate::cluster::{ClusterRegistry, SharedGateway};
use crate::config::SharedSettings;
use crate::crd::{
    DomainEntry, DomainGroup, DomainGroupMapping, DomainGroupMappingSpec, MappingRef,
    BKAPP_API_VERSION,
};
use crate::error::{Error, Result};
use crate::model::{DeployStatus, Domain, EnvName, EnvTarget};
use crate::observability::metrics;
use crate::resources::{self, labels, IngressEntity, IngressPath, IngressRule, SecretEntity};
use crate::store::SharedRepository;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::future::Future;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const SOURCE_SUBDOMAIN: &str = "subdomain";
pub const SOURCE_SUBPATH: &str = "subpath";
pub const SOURCE_CUSTOM: &str = "custom";

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "static pattern")]
    Regex::new(r"^([a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?\.)+[a-z][-a-z0-9]{0,61}[a-z0-9]$")
        .expect("valid regex")
});

pub fn shared_cert_secret_name(cert_name: &str) -> String {
    format!("eng-shared-{cert_name}")
}

pub fn independent_cert_secret_name(cert_name: &str) -> String {
    format!("eng-independent-{cert_name}")
}

/// `foo` and `/foo` both become `/foo/`
pub fn normalize_path_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// A custom domain as requested by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomainRequest {
    pub host: String,
    pub path_prefix: String,
    pub https_enabled: bool,
    /// Independent certificate to serve the domain with
    pub cert_name: Option<String>,
}

/// The mapping of an environment and the secrets it references
#[derive(Debug, Clone, Default)]
pub struct DomainPlan {
    /// `None` when the environment has no address at all
    pub mapping: Option<DomainGroupMapping>,
    pub secrets: Vec<SecretEntity>,
}

struct TlsResolver {
    store: SharedRepository,
    tenant_id: String,
    matcher: SharedCertMatcher,
    labels: BTreeMap<String, String>,
    secrets: BTreeMap<String, SecretEntity>,
}

impl TlsResolver {
    /// `None` for plain HTTP; `Some("")` when https is on but no certificate fits
    async fn resolve(
        &mut self,
        host: &str,
        https_enabled: bool,
        explicit_cert: Option<&str>,
    ) -> Result<Option<String>> {
        if !https_enabled {
            return Ok(None);
        }

        if let Some(cert_name) = explicit_cert {
            match self.store.get_domain_cert(&self.tenant_id, cert_name).await? {
                Some(cert) => {
                    let secret = independent_cert_secret_name(&cert.name);
                    self.secrets.entry(secret.clone()).or_insert_with(|| {
                        SecretEntity::tls(&secret, self.labels.clone(), &cert.cert_data, &cert.key_data, None)
                    });
                    return Ok(Some(secret));
                }
                None => warn!(host = %host, cert = %cert_name, "Independent certificate not found, trying shared ones"),
            }
        }

        if let Some(cert) = self.matcher.match_host(host) {
            let secret = shared_cert_secret_name(&cert.name);
            self.secrets.entry(secret.clone()).or_insert_with(|| {
                SecretEntity::tls(&secret, self.labels.clone(), &cert.cert_data, &cert.key_data, None)
            });
            return Ok(Some(secret));
        }

        Ok(Some(String::new()))
    }
}

#[derive(Clone)]
pub struct DomainManager {
    store: SharedRepository,
    registry: ClusterRegistry,
    gateway: SharedGateway,
    settings: SharedSettings,
}

impl std::fmt::Debug for DomainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainManager").finish_non_exhaustive()
    }
}

impl DomainManager {
    pub fn new(registry: ClusterRegistry, gateway: SharedGateway, settings: SharedSettings) -> Self {
        Self {
            store: registry.store(),
            registry,
            gateway,
            settings,
        }
    }

    /// Compute the mapping of `target` without touching the cluster
    pub async fn plan(&self, target: &EnvTarget) -> Result<DomainPlan> {
        let addresses = EnvAddresses::for_target(target);
        let custom = self
            .store
            .list_custom_domains(target.module.id, target.environment)
            .await?;
        let app_labels = labels::app_labels(
            &target.application.code,
            &target.module.name,
            target.environment,
        );

        let mut tls = TlsResolver {
            store: Arc::clone(&self.store),
            tenant_id: target.application.tenant_id.clone(),
            matcher: SharedCertMatcher::new(
                self.store
                    .list_shared_certs(&target.application.tenant_id)
                    .await?,
            ),
            labels: app_labels.clone(),
            secrets: BTreeMap::new(),
        };

        let mut groups = Vec::new();

        let mut subdomains = Vec::new();
        for d in &addresses.subdomains {
            subdomains.push(DomainEntry {
                host: d.host.clone(),
                path_prefix_list: vec!["/".to_string()],
                tls_secret_name: tls
                    .resolve(&d.host, d.https_enabled, d.tls_secret_name.as_deref())
                    .await?,
            });
        }
        push_group(&mut groups, SOURCE_SUBDOMAIN, subdomains);

        // One entry per host, carrying every sub-path served on it
        let mut subpaths: Vec<DomainEntry> = Vec::new();
        for p in &addresses.subpaths {
            if let Some(entry) = subpaths.iter_mut().find(|e| e.host == p.host) {
                entry.path_prefix_list.push(p.subpath.clone());
                continue;
            }
            subpaths.push(DomainEntry {
                host: p.host.clone(),
                path_prefix_list: vec![p.subpath.clone()],
                tls_secret_name: tls.resolve(&p.host, p.https_enabled, None).await?,
            });
        }
        push_group(&mut groups, SOURCE_SUBPATH, subpaths);

        let mut customs = Vec::new();
        for d in &custom {
            customs.push(DomainEntry {
                host: d.name.clone(),
                path_prefix_list: vec![d.path_prefix.clone()],
                tls_secret_name: tls
                    .resolve(&d.name, d.https_enabled, d.cert_name.as_deref())
                    .await?,
            });
        }
        push_group(&mut groups, SOURCE_CUSTOM, customs);

        if groups.is_empty() {
            return Ok(DomainPlan::default());
        }

        let mut mapping = DomainGroupMapping::new(
            &target.bkapp_name,
            DomainGroupMappingSpec {
                r#ref: MappingRef {
                    name: target.bkapp_name.clone(),
                    kind: "BkApp".to_string(),
                    api_version: BKAPP_API_VERSION.to_string(),
                },
                data: groups,
            },
        );
        mapping.metadata.labels = Some(app_labels);

        Ok(DomainPlan {
            mapping: Some(mapping),
            secrets: tls.secrets.into_values().collect(),
        })
    }

    pub async fn reconcile(
        &self,
        module_id: Uuid,
        environment: EnvName,
    ) -> Result<Option<DomainGroupMapping>> {
        let target = self.registry.env_target(module_id, environment).await?;
        self.reconcile_target(&target).await
    }

    /// Apply the planned mapping, or delete it when the plan is empty
    pub async fn reconcile_target(&self, target: &EnvTarget) -> Result<Option<DomainGroupMapping>> {
        let span = info_span!(
            "domains.reconcile",
            bkapp.name = %target.bkapp_name,
            environment = %target.environment,
            cluster.name = %target.cluster.name
        );
        let result = self.apply_plan(target).instrument(span).await;
        let outcome = match &result {
            Ok(Some(_)) => "applied",
            Ok(None) => "deleted",
            Err(_) => "failed",
        };
        metrics::increment_domain_reconciliations(outcome);
        result
    }

    async fn apply_plan(&self, target: &EnvTarget) -> Result<Option<DomainGroupMapping>> {
        let plan = self.plan(target).await?;
        let (retries, backoff_ms) = {
            let s = self.settings.read().await;
            (s.apply_conflict_max_retries, s.apply_conflict_backoff_ms)
        };

        let Some(mapping) = plan.mapping else {
            let deleted = resources::delete_if_exists::<DomainGroupMapping>(
                self.gateway.as_ref(),
                &target.cluster,
                &target.namespace,
                &target.bkapp_name,
            )
            .await?;
            if deleted {
                info!("Deleted DomainGroupMapping without addresses");
            }
            return Ok(None);
        };

        for secret in &plan.secrets {
            resources::create_or_update(
                self.gateway.as_ref(),
                &target.cluster,
                &target.namespace,
                secret,
                retries,
                backoff_ms,
            )
            .await?;
        }
        resources::create_or_update(
            self.gateway.as_ref(),
            &target.cluster,
            &target.namespace,
            &mapping,
            retries,
            backoff_ms,
        )
        .await?;

        info!(
            groups = mapping.spec.data.len(),
            secrets = plan.secrets.len(),
            "Applied DomainGroupMapping"
        );
        Ok(Some(mapping))
    }

    async fn validate_request(&self, tenant_id: &str, req: &CustomDomainRequest) -> Result<()> {
        if !HOSTNAME.is_match(&req.host) {
            return Err(Error::Validation(format!(
                "'{}' is not a valid domain name",
                req.host
            )));
        }
        if let Some(cert) = &req.cert_name {
            if self.store.get_domain_cert(tenant_id, cert).await?.is_none() {
                return Err(Error::Validation(format!("certificate {cert} not found")));
            }
        }
        Ok(())
    }

    async fn has_successful_deploy(&self, module_id: Uuid, environment: EnvName) -> Result<bool> {
        Ok(self
            .store
            .list_deploys(module_id, environment)
            .await?
            .iter()
            .any(|d| d.status == DeployStatus::Ready))
    }

    /// Add a custom domain; the environment must have been deployed successfully
    pub async fn create_custom_domain(
        &self,
        module_id: Uuid,
        environment: EnvName,
        req: CustomDomainRequest,
    ) -> Result<Domain> {
        let req = CustomDomainRequest {
            host: req.host.trim().to_lowercase(),
            path_prefix: normalize_path_prefix(&req.path_prefix),
            ..req
        };
        let module = self.store.get_module(module_id).await?;
        let application = self.store.get_application(module.application_id).await?;
        self.validate_request(&application.tenant_id, &req).await?;

        if !self.has_successful_deploy(module_id, environment).await? {
            return Err(Error::Validation(format!(
                "module {} has no successful deploy in {environment}, deploy it before adding domains",
                module.name
            )));
        }

        let domain = self
            .store
            .insert_custom_domain(Domain {
                id: 0,
                tenant_id: application.tenant_id.clone(),
                application_id: application.id,
                module_id,
                environment,
                name: req.host,
                path_prefix: req.path_prefix,
                https_enabled: req.https_enabled,
                cert_name: req.cert_name,
            })
            .await?;
        info!(domain.id = domain.id, domain.name = %domain.name, "Created custom domain");

        self.reconcile_or_undo(module_id, environment, async {
            self.store.delete_custom_domain(domain.id).await.map(|_| ())
        })
        .await?;
        Ok(domain)
    }

    pub async fn update_custom_domain(&self, id: i64, req: CustomDomainRequest) -> Result<Domain> {
        let mut domain = self.store.get_custom_domain(id).await?;
        let req = CustomDomainRequest {
            host: req.host.trim().to_lowercase(),
            path_prefix: normalize_path_prefix(&req.path_prefix),
            ..req
        };
        self.validate_request(&domain.tenant_id, &req).await?;

        let moved = req.host != domain.name || req.path_prefix != domain.path_prefix;
        if moved
            && self
                .check_domain_used_by_market(domain.application_id, &domain.name, &domain.path_prefix)
                .await?
        {
            return Err(Error::Validation(format!(
                "{}{} is the market entrance and cannot be changed",
                domain.name, domain.path_prefix
            )));
        }

        let previous = domain.clone();
        domain.name = req.host;
        domain.path_prefix = req.path_prefix;
        domain.https_enabled = req.https_enabled;
        domain.cert_name = req.cert_name;
        self.store.save_custom_domain(&domain).await?;
        info!(domain.id = id, domain.name = %domain.name, "Updated custom domain");

        self.reconcile_or_undo(domain.module_id, domain.environment, async {
            self.store.save_custom_domain(&previous).await
        })
        .await?;
        Ok(domain)
    }

    pub async fn delete_custom_domain(&self, id: i64) -> Result<()> {
        let domain = self.store.get_custom_domain(id).await?;
        if self
            .check_domain_used_by_market(domain.application_id, &domain.name, &domain.path_prefix)
            .await?
        {
            return Err(Error::Validation(format!(
                "{}{} is the market entrance and cannot be deleted",
                domain.name, domain.path_prefix
            )));
        }
        self.store.delete_custom_domain(id).await?;
        info!(domain.id = id, domain.name = %domain.name, "Deleted custom domain");

        self.reconcile_or_undo(domain.module_id, domain.environment, async {
            self.store.save_custom_domain(&domain).await
        })
        .await
    }

    /// Reconcile after a domain row changed. When the mapping cannot be
    /// applied, `undo` restores the row and the reconcile error is returned.
    async fn reconcile_or_undo(
        &self,
        module_id: Uuid,
        environment: EnvName,
        undo: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let Err(e) = self.reconcile(module_id, environment).await else {
            return Ok(());
        };
        warn!(error = %e, "Reconcile failed, rolling back the domain change");
        if let Err(undo_err) = undo.await {
            error!(error = %undo_err, "Failed to roll back the domain change");
        }
        Err(e)
    }

    /// True when the enabled market entrance is exactly `host` + `path_prefix`
    pub async fn check_domain_used_by_market(
        &self,
        application_id: Uuid,
        host: &str,
        path_prefix: &str,
    ) -> Result<bool> {
        let Some(config) = self.store.get_market_config(application_id).await? else {
            return Ok(false);
        };
        let Some(url) = config.custom_domain_url.filter(|_| config.enabled) else {
            return Ok(false);
        };
        let Ok(parsed) = reqwest::Url::parse(&url) else {
            warn!(url = %url, "Unparseable market entrance URL");
            return Ok(false);
        };
        Ok(parsed
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(host))
            && normalize_path_prefix(parsed.path()) == normalize_path_prefix(path_prefix))
    }

    /// Ingresses the operator will render from the mapping of `target`
    pub async fn preview_ingresses(
        &self,
        target: &EnvTarget,
        service_name: &str,
        service_port: &str,
    ) -> Result<Vec<IngressEntity>> {
        let Some(mapping) = self.plan(target).await?.mapping else {
            return Ok(Vec::new());
        };
        let app_labels = mapping.metadata.labels.clone().unwrap_or_default();

        Ok(mapping
            .spec
            .data
            .iter()
            .flat_map(|group| {
                group.domains.iter().enumerate().map(|(idx, entry)| {
                    let rewrites = entry
                        .path_prefix_list
                        .iter()
                        .any(|p| rewrite::needs_rewrite(p));
                    IngressEntity {
                        name: format!("{}-{}-{idx}", target.bkapp_name, group.source_type),
                        labels: app_labels.clone(),
                        annotations: if rewrites {
                            rewrite::rewrite_annotations()
                        } else {
                            BTreeMap::new()
                        },
                        rules: vec![IngressRule {
                            host: entry.host.clone(),
                            paths: entry
                                .path_prefix_list
                                .iter()
                                .map(|p| IngressPath {
                                    path: rewrite::ingress_path(p),
                                    service_name: service_name.to_string(),
                                    service_port: service_port.to_string(),
                                })
                                .collect(),
                            tls_secret_name: entry.tls_secret_name.clone(),
                        }],
                    }
                })
            })
            .collect())
    }
}

fn push_group(groups: &mut Vec<DomainGroup>, source_type: &str, domains: Vec<DomainEntry>) {
    if !domains.is_empty() {
        groups.push(DomainGroup {
            source_type: source_type.to_string(),
            domains,
        });
    }
}
