//! The ordered constructors that assemble a BkApp.
//!
//! Each constructor owns one section of the manifest and is a pure function of
//! the [`ModuleState`]. Optional sections that are absent or empty are left
//! out; only input the operator could not act on is an error.

use super::input::ModuleState;
use super::ManifestConstructorError;
use crate::constants::{
    DEFAULT_PROCESS_REPLICAS, DEFAULT_PROCESS_TARGET_PORT, PROCFILE_RELEASE_ENTRY,
};
use crate::crd::{
    BkApp, BkAppAddon, BkAppHooks, BkAppProcess, EnvOverlay, EnvVar, EnvVarOverlay, Hook,
    Monitoring, Mount, MountOverlay, Observability, ResQuotaPlan, SvcDiscConfig, VolumeSource,
};
use crate::model::EnvName;
use crate::resources::labels;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::LazyLock;
use tracing::warn;

type CResult = Result<(), ManifestConstructorError>;

static ENV_VAR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "static pattern")]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex")
});

static PROCESS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "static pattern")]
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex")
});

pub trait ManifestConstructor: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult;
}

/// Constructors in the order they must run
pub fn default_constructors() -> Vec<Box<dyn ManifestConstructor>> {
    vec![
        Box::new(AnnotationsConstructor),
        Box::new(BuildConstructor),
        Box::new(ProcessesConstructor),
        Box::new(HooksConstructor),
        Box::new(EnvVarsConstructor),
        Box::new(MountsConstructor),
        Box::new(SvcDiscoveryConstructor),
        Box::new(DomainResolutionConstructor),
        Box::new(ObservabilityConstructor),
        Box::new(AddonsConstructor),
        Box::new(AccessControlConstructor),
    ]
}

fn parse_env_name(name: &str) -> Result<EnvName, ManifestConstructorError> {
    name.parse()
        .map_err(|_| ManifestConstructorError::InvalidSpec(format!("unknown envName '{name}'")))
}

fn overlay(bkapp: &mut BkApp) -> &mut EnvOverlay {
    bkapp.spec.env_overlay.get_or_insert_with(EnvOverlay::default)
}

fn bool_str(v: bool) -> String {
    if v { "true" } else { "false" }.to_string()
}

// ============================================================================
// (1) Annotations and labels
// ============================================================================

#[derive(Debug)]
pub struct AnnotationsConstructor;

impl ManifestConstructor for AnnotationsConstructor {
    fn name(&self) -> &'static str {
        "annotations"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut annotations = BTreeMap::from([
            (labels::ANNO_REGION.to_string(), state.application.region.clone()),
            (labels::ANNO_NAME.to_string(), state.application.name.clone()),
            (labels::ANNO_CODE.to_string(), state.application.code.clone()),
            (labels::ANNO_MODULE_NAME.to_string(), state.module.name.clone()),
            (
                labels::ANNO_ENVIRONMENT.to_string(),
                state.environment.as_str().to_string(),
            ),
            (labels::ANNO_WL_APP_NAME.to_string(), state.wl_app_name.clone()),
            (labels::ANNO_USE_CNB.to_string(), bool_str(state.module.use_cnb)),
            (
                labels::ANNO_LOG_COLLECTOR_TYPE.to_string(),
                state.module.log_collector_type.clone(),
            ),
            (
                labels::ANNO_PROC_SERVICES_FEATURE_ENABLED.to_string(),
                bool_str(state.proc_services_enabled),
            ),
        ]);
        if let Some(deploy_id) = &state.deploy_id {
            annotations.insert(labels::ANNO_DEPLOY_ID.to_string(), deploy_id.clone());
        }
        if let Some(secret) = &state.image_credentials_secret {
            annotations.insert(labels::ANNO_IMAGE_CREDENTIALS.to_string(), secret.clone());
        }
        if let Some(site_id) = &state.paas_analysis_site_id {
            annotations.insert(labels::ANNO_PAAS_ANALYSIS_SITE_ID.to_string(), site_id.clone());
        }

        bkapp.metadata.annotations = Some(annotations);
        bkapp.metadata.labels = Some(labels::app_labels(
            &state.application.code,
            &state.module.name,
            state.environment,
        ));
        Ok(())
    }
}

// ============================================================================
// (2) Build
// ============================================================================

#[derive(Debug)]
pub struct BuildConstructor;

impl ManifestConstructor for BuildConstructor {
    fn name(&self) -> &'static str {
        "build"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut build = state.spec.build.clone().unwrap_or_default();
        if build.image.is_none() {
            build.image = state
                .latest_build
                .as_ref()
                .filter(|b| !b.artifact_deleted)
                .and_then(|b| b.image.clone());
        }

        let every_process_has_image = !state.spec.processes.is_empty()
            && state.spec.processes.iter().all(|p| p.image.is_some());
        if build.image.is_none() && !every_process_has_image {
            return Err(ManifestConstructorError::MissingImage);
        }

        build.image_pull_policy.get_or_insert_with(|| "IfNotPresent".to_string());
        bkapp.spec.build = Some(build);
        Ok(())
    }
}

// ============================================================================
// (3) Processes, with their replicas / quota / autoscaling overlays
// ============================================================================

#[derive(Debug)]
pub struct ProcessesConstructor;

impl ProcessesConstructor {
    fn from_procfile(state: &ModuleState) -> Vec<BkAppProcess> {
        state
            .latest_build
            .as_ref()
            .map(|b| {
                b.procfile
                    .iter()
                    .filter(|(name, _)| name.as_str() != PROCFILE_RELEASE_ENTRY)
                    .map(|(name, cmd)| BkAppProcess {
                        name: name.to_lowercase(),
                        command: vec!["sh".to_string(), "-c".to_string(), cmd.clone()],
                        ..BkAppProcess::default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate(process: &BkAppProcess) -> CResult {
        let invalid = |reason: String| ManifestConstructorError::InvalidProcess {
            process: process.name.clone(),
            reason,
        };

        if !PROCESS_NAME.is_match(&process.name) {
            return Err(invalid("name must be a lowercase DNS label".to_string()));
        }
        if process.replicas.is_some_and(|r| r < 0) {
            return Err(invalid("replicas must not be negative".to_string()));
        }
        if let Some(probes) = &process.probes {
            for (kind, probe) in [
                ("liveness", &probes.liveness),
                ("readiness", &probes.readiness),
                ("startup", &probes.startup),
            ] {
                if probe.as_ref().is_some_and(|p| p.handler_count() != 1) {
                    return Err(invalid(format!(
                        "{kind} probe needs exactly one of exec, httpGet or tcpSocket"
                    )));
                }
            }
        }
        if let Some(scaling) = &process.autoscaling {
            if scaling.min_replicas < 1 || scaling.min_replicas > scaling.max_replicas {
                return Err(invalid(format!(
                    "autoscaling range {}..{} is invalid",
                    scaling.min_replicas, scaling.max_replicas
                )));
            }
        }
        Ok(())
    }
}

impl ManifestConstructor for ProcessesConstructor {
    fn name(&self) -> &'static str {
        "processes"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut processes = if state.spec.processes.is_empty() {
            Self::from_procfile(state)
        } else {
            state.spec.processes.clone()
        };
        if processes.is_empty() {
            return Err(ManifestConstructorError::NoProcesses);
        }

        let mut seen = BTreeSet::new();
        for process in &mut processes {
            Self::validate(process)?;
            if !seen.insert(process.name.clone()) {
                return Err(ManifestConstructorError::InvalidProcess {
                    process: process.name.clone(),
                    reason: "duplicated process name".to_string(),
                });
            }
            process.replicas.get_or_insert(DEFAULT_PROCESS_REPLICAS);
            process.res_quota_plan.get_or_insert(ResQuotaPlan::Default);
            process.target_port.get_or_insert(DEFAULT_PROCESS_TARGET_PORT);
        }
        bkapp.spec.processes = processes;

        let Some(user_overlay) = &state.spec.env_overlay else {
            return Ok(());
        };
        let known = |process: &str, section: &str| {
            let found = seen.contains(process);
            if !found {
                warn!(process = %process, section = %section, "Overlay references unknown process, skipped");
            }
            found
        };

        let mut replicas = Vec::new();
        for item in &user_overlay.replicas {
            parse_env_name(&item.env_name)?;
            if known(&item.process, "replicas") {
                replicas.push(item.clone());
            }
        }
        let mut res_quotas = Vec::new();
        for item in &user_overlay.res_quotas {
            parse_env_name(&item.env_name)?;
            if known(&item.process, "resQuotas") {
                res_quotas.push(item.clone());
            }
        }
        let mut autoscaling = Vec::new();
        for item in &user_overlay.autoscaling {
            parse_env_name(&item.env_name)?;
            if item.min_replicas < 1 || item.min_replicas > item.max_replicas {
                return Err(ManifestConstructorError::InvalidProcess {
                    process: item.process.clone(),
                    reason: format!("autoscaling overlay for {} is invalid", item.env_name),
                });
            }
            if known(&item.process, "autoscaling") {
                autoscaling.push(item.clone());
            }
        }

        let target = overlay(bkapp);
        target.replicas = replicas;
        target.res_quotas = res_quotas;
        target.autoscaling = autoscaling;
        Ok(())
    }
}

// ============================================================================
// (4) Hooks
// ============================================================================

#[derive(Debug)]
pub struct HooksConstructor;

impl ManifestConstructor for HooksConstructor {
    fn name(&self) -> &'static str {
        "hooks"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let from_spec = state
            .spec
            .hooks
            .as_ref()
            .and_then(|h| h.pre_release.clone())
            .filter(|h| !h.command.is_empty() || !h.args.is_empty());

        let pre_release = from_spec.or_else(|| {
            state
                .latest_build
                .as_ref()
                .and_then(|b| b.procfile.get(PROCFILE_RELEASE_ENTRY))
                .map(|cmd| Hook {
                    command: vec!["sh".to_string(), "-c".to_string(), cmd.clone()],
                    args: vec![],
                })
        });

        bkapp.spec.hooks = pre_release.map(|hook| BkAppHooks {
            pre_release: Some(hook),
        });
        Ok(())
    }
}

// ============================================================================
// (5) Environment variables
// ============================================================================

#[derive(Debug)]
pub struct EnvVarsConstructor;

impl EnvVarsConstructor {
    fn check_name(name: &str) -> CResult {
        if ENV_VAR_NAME.is_match(name) {
            Ok(())
        } else {
            Err(ManifestConstructorError::InvalidEnvVar {
                name: name.to_string(),
                reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
            })
        }
    }
}

impl ManifestConstructor for EnvVarsConstructor {
    fn name(&self) -> &'static str {
        "env_vars"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        // Later duplicates win, output is alphabetical
        let mut global = BTreeMap::new();
        for var in &state.spec.configuration.env {
            Self::check_name(&var.name)?;
            global.insert(var.name.clone(), var.value.clone());
        }

        let mut per_env: BTreeMap<(EnvName, String), String> = BTreeMap::new();
        for var in state
            .spec
            .env_overlay
            .iter()
            .flat_map(|o| o.env_variables.iter())
        {
            Self::check_name(&var.name)?;
            let env = parse_env_name(&var.env_name)?;
            per_env.insert((env, var.name.clone()), var.value.clone());
        }

        // Built-ins only fill gaps left by the user
        for (name, value) in &state.builtin_env_vars {
            let key = (state.environment, name.clone());
            if !global.contains_key(name) && !per_env.contains_key(&key) {
                per_env.insert(key, value.clone());
            }
        }

        bkapp.spec.configuration.env = global
            .into_iter()
            .map(|(name, value)| EnvVar { name, value })
            .collect();
        overlay(bkapp).env_variables = per_env
            .into_iter()
            .map(|((env, name), value)| EnvVarOverlay {
                env_name: env.as_str().to_string(),
                name,
                value,
            })
            .collect();
        Ok(())
    }
}

// ============================================================================
// (6) Mounts
// ============================================================================

#[derive(Debug)]
pub struct MountsConstructor;

impl MountsConstructor {
    fn check(name: &str, mount_path: &str, source: &VolumeSource) -> CResult {
        let invalid = |reason: &str| ManifestConstructorError::InvalidMount {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if !mount_path.starts_with('/') {
            return Err(invalid("mountPath must be absolute"));
        }
        match (&source.config_map, &source.persistent_storage) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(invalid("a configMap or persistentStorage source is required")),
            (Some(_), Some(_)) => Err(invalid("only one source may be set")),
        }
    }
}

impl ManifestConstructor for MountsConstructor {
    fn name(&self) -> &'static str {
        "mounts"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut names = BTreeSet::new();
        let mut mounts: Vec<Mount> = Vec::new();
        for mount in &state.spec.mounts {
            Self::check(&mount.name, &mount.mount_path, &mount.source)?;
            if !names.insert(mount.name.clone()) {
                return Err(ManifestConstructorError::InvalidMount {
                    name: mount.name.clone(),
                    reason: "duplicated mount name".to_string(),
                });
            }
            mounts.push(mount.clone());
        }
        bkapp.spec.mounts = mounts;

        let mut env_mounts: Vec<MountOverlay> = Vec::new();
        for mount in state.spec.env_overlay.iter().flat_map(|o| o.mounts.iter()) {
            parse_env_name(&mount.env_name)?;
            Self::check(&mount.name, &mount.mount_path, &mount.source)?;
            env_mounts.push(mount.clone());
        }
        overlay(bkapp).mounts = env_mounts;
        Ok(())
    }
}

// ============================================================================
// (7) Service discovery
// ============================================================================

#[derive(Debug)]
pub struct SvcDiscoveryConstructor;

impl ManifestConstructor for SvcDiscoveryConstructor {
    fn name(&self) -> &'static str {
        "svc_discovery"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut entries = Vec::new();
        for entry in state.spec.svc_discovery.iter().flat_map(|s| s.bk_saas.iter()) {
            if entry.bk_app_code.trim().is_empty() {
                return Err(ManifestConstructorError::InvalidSvcDiscovery(
                    "bkAppCode is required".to_string(),
                ));
            }
            if !entries.contains(entry) {
                entries.push(entry.clone());
            }
        }
        bkapp.spec.svc_discovery = (!entries.is_empty()).then_some(SvcDiscConfig { bk_saas: entries });
        Ok(())
    }
}

// ============================================================================
// (8) Domain resolution
// ============================================================================

#[derive(Debug)]
pub struct DomainResolutionConstructor;

impl ManifestConstructor for DomainResolutionConstructor {
    fn name(&self) -> &'static str {
        "domain_resolution"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let Some(resolution) = &state.spec.domain_resolution else {
            bkapp.spec.domain_resolution = None;
            return Ok(());
        };

        for ns in &resolution.nameservers {
            if ns.parse::<IpAddr>().is_err() {
                return Err(ManifestConstructorError::InvalidDomainResolution(format!(
                    "nameserver '{ns}' is not an IP address"
                )));
            }
        }
        for alias in &resolution.host_aliases {
            if alias.ip.parse::<IpAddr>().is_err() {
                return Err(ManifestConstructorError::InvalidDomainResolution(format!(
                    "host alias IP '{}' is invalid",
                    alias.ip
                )));
            }
            if alias.hostnames.is_empty() {
                return Err(ManifestConstructorError::InvalidDomainResolution(format!(
                    "host alias {} has no hostnames",
                    alias.ip
                )));
            }
        }

        bkapp.spec.domain_resolution = (!resolution.nameservers.is_empty()
            || !resolution.host_aliases.is_empty())
        .then(|| resolution.clone());
        Ok(())
    }
}

// ============================================================================
// (9) Observability
// ============================================================================

#[derive(Debug)]
pub struct ObservabilityConstructor;

impl ManifestConstructor for ObservabilityConstructor {
    fn name(&self) -> &'static str {
        "observability"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let processes: BTreeSet<&str> = bkapp.spec.processes.iter().map(|p| p.name.as_str()).collect();
        let metrics: Vec<_> = state
            .spec
            .observability
            .iter()
            .filter_map(|o| o.monitoring.as_ref())
            .flat_map(|m| m.metrics.iter())
            .filter(|metric| {
                let known = processes.contains(metric.process.as_str());
                if !known {
                    warn!(process = %metric.process, "Metric references unknown process, skipped");
                }
                known
            })
            .cloned()
            .collect();

        bkapp.spec.observability = (!metrics.is_empty()).then(|| Observability {
            monitoring: Some(Monitoring { metrics }),
        });
        Ok(())
    }
}

// ============================================================================
// (10) Addons
// ============================================================================

#[derive(Debug)]
pub struct AddonsConstructor;

impl ManifestConstructor for AddonsConstructor {
    fn name(&self) -> &'static str {
        "addons"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        let mut addons: BTreeMap<String, BkAppAddon> = state
            .spec
            .addons
            .iter()
            .map(|a| (a.name.clone(), a.clone()))
            .collect();
        for binding in &state.addon_bindings {
            addons
                .entry(binding.service_name.clone())
                .or_insert_with(|| BkAppAddon {
                    name: binding.service_name.clone(),
                    specs: vec![],
                    shared_from: binding.shared_from.clone(),
                });
        }

        let names: Vec<&String> = addons.keys().collect();
        let encoded = serde_json::to_string(&names)
            .map_err(|e| ManifestConstructorError::InvalidSpec(e.to_string()))?;
        bkapp
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(labels::ANNO_ADDONS.to_string(), encoded);

        bkapp.spec.addons = addons.into_values().collect();
        Ok(())
    }
}

// ============================================================================
// (11) Access control
// ============================================================================

#[derive(Debug)]
pub struct AccessControlConstructor;

impl ManifestConstructor for AccessControlConstructor {
    fn name(&self) -> &'static str {
        "access_control"
    }

    fn apply(&self, bkapp: &mut BkApp, state: &ModuleState) -> CResult {
        if state.application.access_control_enabled {
            bkapp
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(labels::ANNO_ACCESS_CONTROL.to_string(), "true".to_string());
        }
        Ok(())
    }
}
