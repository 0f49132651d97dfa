//! # Deploy Controller
//!
//! Turns a revision into a running environment.
//!
//! ## Pipeline
//!
//! 1. Record a `pending` deploy and supersede older unfinished ones
//! 2. Parse the revision and check its image credential references
//! 3. Resolve the cluster and compile the BkApp once as a validation pass
//! 4. Ensure the namespace, then apply the pull secret, the addon TLS
//!    secrets and the service discovery ConfigMap
//! 5. Compile the BkApp with the late-bound values and apply it
//! 6. Freeze the revision, snapshot the WlApp Config and start polling
//!
//! Any failure ends the deploy as `error` with a reason derived from the
//! error class; the message is the error text, verbatim for API server
//! errors. Failures in steps 1 to 3 never touch the cluster.

use crate::auxiliary::{addon_tls, image_credentials};
use crate::cluster::{ClusterRegistry, SharedGateway};
use crate::config::SharedSettings;
use crate::constants::FEATURE_PROC_SERVICES;
use crate::crd::BkApp;
use crate::deploy::env_vars::builtin_env_vars;
use crate::error::{Error, ErrorKind, Result};
use crate::manifest::{get_bk_app_resource, naming, parse_revision_spec, ModuleState};
use crate::model::{
    deploy, AppModelDeploy, AppModelRevision, Application, DeployStatus, EnvName, EnvTarget,
    ModelResState, Module, ServiceInstanceBinding, WlAppConfig,
};
use crate::observability::metrics;
use crate::poller::{PollQueue, PollTask};
use crate::resources;
use crate::store::SharedRepository;
use crate::svc_discovery::{self, PreallocatedEntranceResolver, SvcDiscoveryProjector};
use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct DeployController {
    registry: ClusterRegistry,
    store: SharedRepository,
    gateway: SharedGateway,
    settings: SharedSettings,
    queue: PollQueue,
    entrances: PreallocatedEntranceResolver,
    svc_discovery: SvcDiscoveryProjector,
}

impl std::fmt::Debug for DeployController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployController")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Reason recorded on a deploy that failed with `err`
fn failure_reason(err: &Error) -> &'static str {
    match err {
        Error::InvalidImageCredentials { .. } => deploy::REASON_INVALID_CREDENTIALS,
        _ => match err.kind() {
            ErrorKind::Validation => deploy::REASON_VALIDATION,
            ErrorKind::ClusterResolution => deploy::REASON_CLUSTER,
            _ => deploy::REASON_INTERNAL,
        },
    }
}

impl DeployController {
    pub fn new(
        registry: ClusterRegistry,
        gateway: SharedGateway,
        settings: SharedSettings,
        queue: PollQueue,
        svc_discovery: SvcDiscoveryProjector,
    ) -> Self {
        Self {
            store: registry.store(),
            entrances: PreallocatedEntranceResolver::new(registry.clone()),
            registry,
            gateway,
            settings,
            queue,
            svc_discovery,
        }
    }

    /// Deploy `revision_id` to `environment` of the module.
    ///
    /// Returns the deploy id once the BkApp is applied and polling started.
    /// A failed deploy is still recorded; its id travels in
    /// [`Error::DeployFailed`].
    pub async fn deploy(
        &self,
        module_id: Uuid,
        environment: EnvName,
        revision_id: i64,
        operator: &str,
    ) -> Result<i64> {
        let span = info_span!(
            "deploy",
            module.id = %module_id,
            environment = %environment,
            revision.id = revision_id,
            deploy.id = tracing::field::Empty,
        );
        async move {
            let module = self.store.get_module(module_id).await?;
            let application = self.store.get_application(module.application_id).await?;
            let revision = self.store.get_revision(revision_id).await?;
            if revision.module_id != module_id {
                return Err(Error::Validation(format!(
                    "revision {revision_id} does not belong to module {}",
                    module.name
                )));
            }

            let mut record = self
                .create_deploy(&application, &module, environment, revision_id, operator)
                .await?;
            tracing::Span::current().record("deploy.id", record.id);

            match self.run(&record, revision, &application, &module).await {
                Ok(()) => Ok(record.id),
                Err(e) => {
                    self.fail(&mut record, &e).await;
                    Err(Error::DeployFailed {
                        deploy_id: record.id,
                        source: Box::new(e),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Ask the poller to stop following a deploy.
    ///
    /// The status changes to `unknown/interrupted` on its next probe.
    pub async fn interrupt(&self, deploy_id: i64, reason: &str) -> Result<AppModelDeploy> {
        let mut record = self.store.get_deploy(deploy_id).await?;
        if !record.mark_interrupted(reason) {
            return Err(Error::Conflict(format!(
                "deploy {deploy_id} already finished with status {}",
                record.status
            )));
        }
        self.store.save_deploy(&record).await?;
        info!(deploy.id = deploy_id, reason, "Deploy interruption requested");
        Ok(record)
    }

    async fn create_deploy(
        &self,
        application: &Application,
        module: &Module,
        environment: EnvName,
        revision_id: i64,
        operator: &str,
    ) -> Result<AppModelDeploy> {
        let now = Utc::now();
        let record = self
            .store
            .insert_deploy(AppModelDeploy {
                id: 0,
                name: AppModelDeploy::make_name(&application.code, revision_id, now),
                application_id: application.id,
                module_id: module.id,
                environment_name: environment,
                revision_id,
                status: DeployStatus::Pending,
                reason: None,
                message: None,
                operator: operator.to_string(),
                created: now,
                last_transition_time: Some(now),
                is_interrupted: false,
                interrupted_reason: None,
            })
            .await?;
        metrics::increment_deploys_created();

        let superseded = ModelResState::new(DeployStatus::Unknown).with_reason(
            deploy::REASON_SUPERSEDED,
            format!("superseded by deploy {}", record.id),
        );
        for mut older in self.store.list_deploys(module.id, environment).await? {
            if older.id != record.id && older.transition(&superseded, now) {
                self.store.save_deploy(&older).await?;
                metrics::increment_deploys_finished(DeployStatus::Unknown.as_str());
                info!(superseded.id = older.id, "Superseded unfinished deploy");
            }
        }
        Ok(record)
    }

    async fn fail(&self, record: &mut AppModelDeploy, err: &Error) {
        let state = ModelResState::new(DeployStatus::Error)
            .with_reason(failure_reason(err), err.to_string());
        error!(reason = failure_reason(err), error = %err, "Deploy failed");
        if record.transition(&state, Utc::now()) {
            metrics::increment_deploys_finished(DeployStatus::Error.as_str());
            if let Err(e) = self.store.save_deploy(record).await {
                error!(error = %e, "Failed to record deploy failure");
            }
        }
    }

    async fn run(
        &self,
        record: &AppModelDeploy,
        mut revision: AppModelRevision,
        application: &Application,
        module: &Module,
    ) -> Result<()> {
        let environment = record.environment_name;
        let spec = parse_revision_spec(&revision.json_value)?;

        let bkapp_name = naming::generate_bkapp_name(&application.code, &module.name, module.is_default);
        let refs = BkApp::new(&bkapp_name, spec.clone()).image_credential_refs();
        let credentials =
            image_credentials::resolve_credentials(self.store.as_ref(), application.id, &refs).await?;

        let target = self.registry.env_target(module.id, environment).await?;
        let (retries, backoff_ms) = {
            let s = self.settings.read().await;
            (s.apply_conflict_max_retries, s.apply_conflict_backoff_ms)
        };

        let latest_build = self
            .store
            .get_latest_build(module.id)
            .await?
            .filter(|b| !b.artifact_deleted);
        let bindings = self.store.list_bindings(module.id, environment).await?;
        let preallocated = self.entrances.module_urls(module.id).await?;

        // Compile once without the late-bound values so an invalid manifest
        // is rejected before anything is written to the cluster
        let mut state = ModuleState {
            application: application.clone(),
            module: module.clone(),
            environment,
            bkapp_name: target.bkapp_name.clone(),
            wl_app_name: target.wl_app_name.clone(),
            deploy_id: Some(record.id.to_string()),
            spec,
            latest_build,
            builtin_env_vars: builtin_env_vars(application, module, environment, &preallocated, None)?,
            addon_bindings: bindings.clone(),
            image_credentials_secret: None,
            proc_services_enabled: target
                .cluster
                .feature_flags
                .get(FEATURE_PROC_SERVICES)
                .copied()
                .unwrap_or(true),
            paas_analysis_site_id: None,
        };
        get_bk_app_resource(&state)?;

        self.gateway
            .ensure_namespace(&target.cluster, &target.namespace)
            .await?;

        state.image_credentials_secret = image_credentials::reconcile(
            self.gateway.as_ref(),
            &target,
            image_credentials::build_entity(
                &target,
                &state.spec,
                state.latest_build.as_ref().and_then(|b| b.image.as_deref()),
                &credentials,
            ),
            retries,
            backoff_ms,
        )
        .await?;

        addon_tls::reconcile(self.gateway.as_ref(), &target, &bindings, retries, backoff_ms).await?;

        let svc_value = self
            .svc_discovery
            .reconcile(&target, state.spec.svc_discovery.as_ref())
            .await?
            .and_then(|cm| cm.data.get(svc_discovery::CONFIGMAP_KEY).cloned());
        if svc_value.is_some() {
            state.builtin_env_vars = builtin_env_vars(
                application,
                module,
                environment,
                &preallocated,
                svc_value.as_deref(),
            )?;
        }
        let builtins = state.builtin_env_vars.clone();
        let bkapp = get_bk_app_resource(&state)?;

        resources::create_or_update(
            self.gateway.as_ref(),
            &target.cluster,
            &target.namespace,
            &bkapp,
            retries,
            backoff_ms,
        )
        .await?;
        info!(bkapp.name = %target.bkapp_name, namespace = %target.namespace, "Applied BkApp");

        if revision.has_deployed {
            debug!(revision.id = revision.id, "Revision was deployed before, keeping its value");
        } else {
            revision.mark_deployed(serde_json::to_value(&bkapp)?)?;
            self.store.save_revision(&revision).await?;
        }

        self.snapshot_config(&target, record, builtins, &bindings).await?;

        if !self.queue.enqueue(PollTask::new(record.id, target)) {
            warn!("Deploy is already being polled");
        }
        Ok(())
    }

    /// Append a Config snapshot carrying the cluster binding and deploy id
    async fn snapshot_config(
        &self,
        target: &EnvTarget,
        record: &AppModelDeploy,
        env_vars: std::collections::BTreeMap<String, String>,
        bindings: &[ServiceInstanceBinding],
    ) -> Result<()> {
        let module_env = self
            .store
            .get_module_env(target.module.id, target.environment)
            .await?;
        let current = self.store.latest_config(module_env.wl_app_uuid).await?;

        let mut config = match current {
            Some(c) => c.next(),
            None => WlAppConfig {
                wl_app_uuid: module_env.wl_app_uuid,
                created: Utc::now(),
                env_vars: std::collections::BTreeMap::new(),
                node_selector: std::collections::BTreeMap::new(),
                tolerations: Vec::new(),
                cluster: None,
                metadata: crate::model::WlAppMetadata {
                    paas_app_code: target.application.code.clone(),
                    module_name: target.module.name.clone(),
                    environment: target.environment,
                    addons: Vec::new(),
                    bkpaas_deploy_id: None,
                },
            },
        };

        let mut node_selector = target.cluster.default_node_selector.clone();
        node_selector.extend(config.node_selector);
        config.node_selector = node_selector;
        if config.tolerations.is_empty() {
            config.tolerations.clone_from(&target.cluster.default_tolerations);
        }
        config.env_vars = env_vars;
        config.cluster = Some(target.cluster.name.clone());
        config.metadata.bkpaas_deploy_id = Some(record.id.to_string());
        config.metadata.addons = bindings.iter().map(|b| b.service_name.clone()).collect();
        config.metadata.addons.sort();
        config.metadata.addons.dedup();

        self.store.append_config(config).await
    }
}
