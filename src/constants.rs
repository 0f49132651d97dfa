//! # Constants
//!
//! Shared constants used throughout the deployment core.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Consecutive `error` probe results tolerated before a deploy is failed
pub const DEFAULT_POLLING_FAILURE_LIMITS: u32 = 3;

/// Delay between two status probes of the same deploy (seconds)
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 3;

/// Wall-clock budget for one deploy before it is marked `error(timeout)` (seconds)
pub const DEFAULT_POLLING_TIMEOUT_SECS: u64 = 15 * 60;

/// Network deadline of a single status probe (seconds)
pub const DEFAULT_PROBE_DEADLINE_SECS: u64 = 30;

/// How long a selected API server endpoint is reused before re-probing (seconds)
pub const DEFAULT_CLUSTER_ENDPOINT_CACHE_TTL_SECS: u64 = 30;

/// Attempts made when the API server answers 409 Conflict
pub const DEFAULT_APPLY_CONFLICT_MAX_RETRIES: u32 = 3;

/// Starting value of the conflict retry backoff (milliseconds)
pub const DEFAULT_APPLY_CONFLICT_BACKOFF_MS: u64 = 200;

/// Heartbeat interval of process watch streams (seconds)
pub const DEFAULT_WATCH_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Capacity of the channel between a cluster watch and its consumer
pub const DEFAULT_WATCH_CHANNEL_CAPACITY: usize = 64;

/// Number of newest image builds kept per module by retention
pub const DEFAULT_IMAGE_RETENTION_MAX_RESERVED: usize = 10;

/// Name of the ConfigMap the settings are hot-reloaded from
pub const DEFAULT_SETTINGS_CONFIGMAP_NAME: &str = "cnative-deployer-config";

/// Namespace the deployer itself runs in
pub const DEFAULT_POD_NAMESPACE: &str = "bkpaas-system";

/// Maximum length of a generated BkApp name (DNS-1123 label subset)
pub const BKAPP_NAME_MAX_LEN: usize = 40;

/// `BKPAAS_MAJOR_VERSION` injected into every workload
pub const BKPAAS_MAJOR_VERSION: &str = "3";

/// Service account created in every application namespace
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Name of the default module of an application
pub const DEFAULT_MODULE_NAME: &str = "default";

/// Replicas given to processes that do not declare any
pub const DEFAULT_PROCESS_REPLICAS: i32 = 1;

/// Target port given to processes that do not declare any
pub const DEFAULT_PROCESS_TARGET_PORT: i32 = 5000;

/// Procfile entry used as pre-release hook when the manifest declares none
pub const PROCFILE_RELEASE_ENTRY: &str = "release";

/// Cluster feature flag controlling process services; on unless set to false
pub const FEATURE_PROC_SERVICES: &str = "proc_services";
