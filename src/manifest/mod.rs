//! # Manifest
//!
//! Compiles the desired spec of a module environment into a BkApp resource.
//!
//! The compiler seeds an empty BkApp named after the module and hands it to an
//! ordered list of [`ManifestConstructor`]s. Each constructor fills one section;
//! the first one that rejects its input aborts the compilation.
//!
//! ## Module Structure
//!
//! - `naming.rs` - deterministic BkApp names
//! - `input.rs` - [`ModuleState`], everything the constructors read
//! - `constructors.rs` - the ordered constructors

mod constructors;
mod input;
pub mod naming;

pub use constructors::{default_constructors, ManifestConstructor};
pub use input::{parse_revision_spec, ModuleState};

use crate::crd::{BkApp, BkAppSpec};
use thiserror::Error;
use tracing::{debug, instrument};

/// Input the manifest compiler cannot turn into a BkApp
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestConstructorError {
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("no image available, set spec.build.image or build the module first")]
    MissingImage,

    #[error("no processes defined")]
    NoProcesses,

    #[error("invalid process {process}: {reason}")]
    InvalidProcess { process: String, reason: String },

    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnvVar { name: String, reason: String },

    #[error("invalid mount {name}: {reason}")]
    InvalidMount { name: String, reason: String },

    #[error("invalid service discovery: {0}")]
    InvalidSvcDiscovery(String),

    #[error("invalid domain resolution: {0}")]
    InvalidDomainResolution(String),
}

/// Build the BkApp of `state` with the default constructors
#[instrument(skip(state), fields(bkapp.name = %state.bkapp_name, environment = %state.environment))]
pub fn get_bk_app_resource(state: &ModuleState) -> Result<BkApp, ManifestConstructorError> {
    compile_with(state, &default_constructors())
}

/// Build the BkApp of `state` with an explicit constructor list
pub fn compile_with(
    state: &ModuleState,
    constructors: &[Box<dyn ManifestConstructor>],
) -> Result<BkApp, ManifestConstructorError> {
    let mut bkapp = BkApp::new(&state.bkapp_name, BkAppSpec::default());

    for constructor in constructors {
        constructor.apply(&mut bkapp, state).inspect_err(|e| {
            debug!(constructor = constructor.name(), error = %e, "Constructor rejected input");
        })?;
    }

    if bkapp.spec.env_overlay.as_ref().is_some_and(|o| o.is_empty()) {
        bkapp.spec.env_overlay = None;
    }
    Ok(bkapp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        BkAppBuildConfig, BkAppProcess, EnvVar, EnvVarOverlay, EnvOverlay, Metric, Monitoring,
        Mount, Observability, ResQuotaPlan, VolumeSource, BKAPP_API_VERSION,
    };
    use crate::model::{Application, ArtifactType, Build, EnvName, Module, ServiceInstanceBinding};
    use crate::resources::labels;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn state() -> ModuleState {
        let application = Application {
            id: Uuid::new_v4(),
            code: "demo".to_string(),
            name: "Demo".to_string(),
            tenant_id: "default".to_string(),
            region: "default".to_string(),
            secret: "s3cret".to_string(),
            access_control_enabled: false,
        };
        let module = Module {
            id: Uuid::new_v4(),
            application_id: application.id,
            name: "default".to_string(),
            is_default: true,
            use_cnb: true,
            log_collector_type: "ELK".to_string(),
        };
        ModuleState {
            application,
            module,
            environment: EnvName::Stag,
            bkapp_name: "demo".to_string(),
            wl_app_name: "demo-stag".to_string(),
            deploy_id: Some("42".to_string()),
            spec: BkAppSpec {
                build: Some(BkAppBuildConfig {
                    image: Some("registry.local/demo:v1".to_string()),
                    ..Default::default()
                }),
                processes: vec![BkAppProcess {
                    name: "web".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            latest_build: None,
            builtin_env_vars: BTreeMap::new(),
            addon_bindings: vec![],
            image_credentials_secret: None,
            proc_services_enabled: true,
            paas_analysis_site_id: None,
        }
    }

    fn build_with_procfile(procfile: &[(&str, &str)]) -> Build {
        Build {
            uuid: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            module_id: Uuid::new_v4(),
            image: Some("registry.local/demo:built".to_string()),
            image_repository: None,
            image_tag: None,
            artifact_type: ArtifactType::Image,
            artifact_deleted: false,
            procfile: procfile
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            owner: "admin".to_string(),
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[test]
    fn test_minimal_spec_gets_defaults_and_metadata() {
        let app = get_bk_app_resource(&state()).unwrap();
        assert_eq!(app.metadata.name.as_deref(), Some("demo"));
        let value = serde_json::to_value(&app).unwrap();
        assert_eq!(value["apiVersion"], BKAPP_API_VERSION);

        let web = &app.spec.processes[0];
        assert_eq!(web.replicas, Some(1));
        assert_eq!(web.res_quota_plan, Some(ResQuotaPlan::Default));
        assert_eq!(web.target_port, Some(5000));

        let annotations = app.metadata.annotations.unwrap();
        assert_eq!(annotations[labels::ANNO_DEPLOY_ID], "42");
        assert_eq!(annotations[labels::ANNO_WL_APP_NAME], "demo-stag");
        assert_eq!(annotations[labels::ANNO_ADDONS], "[]");
        assert!(!annotations.contains_key(labels::ANNO_ACCESS_CONTROL));
        assert!(labels::has_app_labels(&app.metadata.labels.unwrap()));
        assert!(app.spec.env_overlay.is_none());
        assert!(app.spec.hooks.is_none());
    }

    #[test]
    fn test_image_falls_back_to_latest_build() {
        let mut s = state();
        s.spec.build = None;
        assert_eq!(
            get_bk_app_resource(&s).unwrap_err(),
            ManifestConstructorError::MissingImage
        );

        s.latest_build = Some(build_with_procfile(&[]));
        let app = get_bk_app_resource(&s).unwrap();
        assert_eq!(
            app.spec.build.and_then(|b| b.image).as_deref(),
            Some("registry.local/demo:built")
        );
    }

    #[test]
    fn test_procfile_supplies_processes_and_release_hook() {
        let mut s = state();
        s.spec.processes.clear();
        s.latest_build = Some(build_with_procfile(&[
            ("web", "gunicorn app"),
            ("release", "python manage.py migrate"),
        ]));

        let app = get_bk_app_resource(&s).unwrap();
        let names: Vec<_> = app.spec.processes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["web"]);
        let hook = app.spec.hooks.and_then(|h| h.pre_release).unwrap();
        assert_eq!(hook.command[2], "python manage.py migrate");
    }

    #[test]
    fn test_duplicated_process_is_rejected() {
        let mut s = state();
        s.spec.processes.push(s.spec.processes[0].clone());
        assert!(matches!(
            get_bk_app_resource(&s),
            Err(ManifestConstructorError::InvalidProcess { .. })
        ));
    }

    #[test]
    fn test_env_vars_are_sorted_and_builtins_do_not_override_user_values() {
        let mut s = state();
        s.spec.configuration.env = vec![
            EnvVar { name: "ZED".to_string(), value: "1".to_string() },
            EnvVar { name: "ALPHA".to_string(), value: "old".to_string() },
            EnvVar { name: "ALPHA".to_string(), value: "new".to_string() },
        ];
        s.spec.env_overlay = Some(EnvOverlay {
            env_variables: vec![EnvVarOverlay {
                env_name: "stag".to_string(),
                name: "BKPAAS_ENVIRONMENT".to_string(),
                value: "custom".to_string(),
            }],
            ..Default::default()
        });
        s.builtin_env_vars = BTreeMap::from([
            ("BKPAAS_ENVIRONMENT".to_string(), "stag".to_string()),
            ("BKPAAS_APP_ID".to_string(), "demo".to_string()),
            ("ZED".to_string(), "builtin".to_string()),
        ]);

        let app = get_bk_app_resource(&s).unwrap();
        let global: Vec<_> = app
            .spec
            .configuration
            .env
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(global, vec![("ALPHA", "new"), ("ZED", "1")]);

        let overlay: Vec<_> = app
            .spec
            .env_overlay
            .unwrap()
            .env_variables
            .into_iter()
            .map(|v| (v.name, v.value))
            .collect();
        assert_eq!(
            overlay,
            vec![
                ("BKPAAS_APP_ID".to_string(), "demo".to_string()),
                ("BKPAAS_ENVIRONMENT".to_string(), "custom".to_string()),
            ]
        );
    }

    #[test]
    fn test_mount_without_source_is_rejected() {
        let mut s = state();
        s.spec.mounts = vec![Mount {
            name: "conf".to_string(),
            mount_path: "/etc/conf".to_string(),
            source: VolumeSource::default(),
        }];
        assert!(matches!(
            get_bk_app_resource(&s),
            Err(ManifestConstructorError::InvalidMount { .. })
        ));
    }

    #[test]
    fn test_metrics_of_unknown_processes_are_dropped() {
        let mut s = state();
        s.spec.observability = Some(Observability {
            monitoring: Some(Monitoring {
                metrics: vec![
                    Metric {
                        process: "web".to_string(),
                        service_name: "metrics".to_string(),
                        path: "/metrics".to_string(),
                        params: BTreeMap::new(),
                    },
                    Metric {
                        process: "ghost".to_string(),
                        service_name: "metrics".to_string(),
                        path: "/metrics".to_string(),
                        params: BTreeMap::new(),
                    },
                ],
            }),
        });
        let app = get_bk_app_resource(&s).unwrap();
        let metrics = app.spec.observability.and_then(|o| o.monitoring).unwrap().metrics;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].process, "web");
    }

    #[test]
    fn test_bindings_become_addons_and_access_control_annotates() {
        let mut s = state();
        s.application.access_control_enabled = true;
        s.addon_bindings = vec![ServiceInstanceBinding {
            module_id: s.module.id,
            environment: EnvName::Stag,
            service_name: "mysql".to_string(),
            plan_name: "default".to_string(),
            credentials: BTreeMap::new(),
            tls: None,
            shared_from: None,
        }];
        let app = get_bk_app_resource(&s).unwrap();
        assert_eq!(app.spec.addons[0].name, "mysql");
        let annotations = app.metadata.annotations.unwrap();
        assert_eq!(annotations[labels::ANNO_ADDONS], r#"["mysql"]"#);
        assert_eq!(annotations[labels::ANNO_ACCESS_CONTROL], "true");
    }

    #[test]
    fn test_overlay_with_unknown_env_is_rejected() {
        let mut s = state();
        s.spec.env_overlay = Some(EnvOverlay {
            env_variables: vec![EnvVarOverlay {
                env_name: "dev".to_string(),
                name: "A".to_string(),
                value: "1".to_string(),
            }],
            ..Default::default()
        });
        assert!(matches!(
            get_bk_app_resource(&s),
            Err(ManifestConstructorError::InvalidSpec(_))
        ));
    }
}
