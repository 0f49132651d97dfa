//! # Deployer Settings
//!
//! Runtime settings loaded from environment variables, with every value
//! overridable from the settings ConfigMap at runtime.

use std::collections::BTreeSet;
use std::time::Duration;

/// Settings of the deployment core
///
/// All settings have defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Consecutive `error` probe results tolerated before failing a deploy
    pub polling_failure_limits: u32,
    /// Delay between two probes of the same deploy (seconds)
    pub polling_interval_secs: u64,
    /// Overall deploy budget (seconds)
    pub polling_timeout_secs: u64,
    /// Network deadline of one probe (seconds)
    pub probe_deadline_secs: u64,
    /// Condition reasons that make a `False` condition a failure.
    /// Any other `False` condition is considered part of a normal rollout.
    pub hard_failure_reasons: BTreeSet<String>,
    /// Endpoint selection cache lifetime (seconds)
    pub cluster_endpoint_cache_ttl_secs: u64,
    /// Attempts on 409 Conflict before giving up
    pub apply_conflict_max_retries: u32,
    /// First conflict retry delay (milliseconds)
    pub apply_conflict_backoff_ms: u64,
    /// Process watch heartbeat (seconds)
    pub watch_heartbeat_interval_secs: u64,
    /// Process watch channel capacity
    pub watch_channel_capacity: usize,
    /// Builds kept per module by image retention
    pub image_retention_max_reserved: usize,
    /// Metrics and probes port
    pub metrics_port: u16,
    /// Namespace the deployer runs in
    pub pod_namespace: String,
    /// ConfigMap the settings are hot-reloaded from
    pub settings_configmap_name: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Load settings from process environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup.
    ///
    /// Keys are the upper-case environment variable names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            polling_failure_limits: parse_or(
                &lookup,
                "CNATIVE_DEPLOY_STATUS_POLLING_FAILURE_LIMITS",
                DEFAULT_POLLING_FAILURE_LIMITS,
            ),
            polling_interval_secs: parse_or(
                &lookup,
                "CNATIVE_DEPLOY_STATUS_POLLING_INTERVAL_SECS",
                DEFAULT_POLLING_INTERVAL_SECS,
            ),
            polling_timeout_secs: parse_or(
                &lookup,
                "CNATIVE_DEPLOY_STATUS_POLLING_TIMEOUT_SECS",
                DEFAULT_POLLING_TIMEOUT_SECS,
            ),
            probe_deadline_secs: parse_or(
                &lookup,
                "CNATIVE_DEPLOY_PROBE_DEADLINE_SECS",
                DEFAULT_PROBE_DEADLINE_SECS,
            ),
            hard_failure_reasons: lookup("CNATIVE_DEPLOY_HARD_FAILURE_REASONS")
                .map_or_else(default_hard_failure_reasons, |v| parse_list(&v)),
            cluster_endpoint_cache_ttl_secs: parse_or(
                &lookup,
                "CLUSTER_ENDPOINT_CACHE_TTL_SECS",
                DEFAULT_CLUSTER_ENDPOINT_CACHE_TTL_SECS,
            ),
            apply_conflict_max_retries: parse_or(
                &lookup,
                "APPLY_CONFLICT_MAX_RETRIES",
                DEFAULT_APPLY_CONFLICT_MAX_RETRIES,
            ),
            apply_conflict_backoff_ms: parse_or(
                &lookup,
                "APPLY_CONFLICT_BACKOFF_MS",
                DEFAULT_APPLY_CONFLICT_BACKOFF_MS,
            ),
            watch_heartbeat_interval_secs: parse_or(
                &lookup,
                "WATCH_HEARTBEAT_INTERVAL_SECS",
                DEFAULT_WATCH_HEARTBEAT_INTERVAL_SECS,
            ),
            watch_channel_capacity: parse_or(
                &lookup,
                "WATCH_CHANNEL_CAPACITY",
                DEFAULT_WATCH_CHANNEL_CAPACITY,
            ),
            image_retention_max_reserved: parse_or(
                &lookup,
                "IMAGE_RETENTION_MAX_RESERVED",
                DEFAULT_IMAGE_RETENTION_MAX_RESERVED,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            pod_namespace: str_or(&lookup, "POD_NAMESPACE", DEFAULT_POD_NAMESPACE),
            settings_configmap_name: str_or(
                &lookup,
                "SETTINGS_CONFIGMAP_NAME",
                DEFAULT_SETTINGS_CONFIGMAP_NAME,
            ),
            log_level: str_or(&lookup, "LOG_LEVEL", "INFO"),
            log_format: str_or(&lookup, "LOG_FORMAT", "json"),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn polling_timeout(&self) -> Duration {
        Duration::from_secs(self.polling_timeout_secs)
    }

    pub fn probe_deadline(&self) -> Duration {
        Duration::from_secs(self.probe_deadline_secs)
    }

    pub fn cluster_endpoint_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cluster_endpoint_cache_ttl_secs)
    }

    pub fn watch_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.watch_heartbeat_interval_secs)
    }

    /// True when `reason` marks a `False` condition as a real failure
    pub fn is_hard_failure(&self, reason: &str) -> bool {
        self.hard_failure_reasons.contains(reason)
    }
}

/// Reasons the operator only reports when a rollout cannot make progress
fn default_hard_failure_reasons() -> BTreeSet<String> {
    [
        "ReconcileError",
        "ProgressDeadlineExceeded",
        "HookFailed",
        "ProvisionFailed",
        "InvalidImage",
        "ImagePullBackOff",
        "ErrImagePull",
        "CrashLoopBackOff",
        "CreateContainerConfigError",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn str_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.polling_failure_limits, 3);
        assert_eq!(settings.polling_timeout(), Duration::from_secs(900));
        assert_eq!(settings.probe_deadline(), Duration::from_secs(30));
        assert_eq!(settings.metrics_port, 5000);
        assert!(settings.is_hard_failure("ProgressDeadlineExceeded"));
        assert!(!settings.is_hard_failure("MinimumReplicasUnavailable"));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let values: HashMap<&str, &str> = [
            ("CNATIVE_DEPLOY_STATUS_POLLING_FAILURE_LIMITS", "5"),
            ("CNATIVE_DEPLOY_PROBE_DEADLINE_SECS", "not-a-number"),
            ("CNATIVE_DEPLOY_HARD_FAILURE_REASONS", " Boom , ,Crash"),
        ]
        .into_iter()
        .collect();
        let settings = Settings::from_lookup(|k| values.get(k).map(|v| (*v).to_string()));

        assert_eq!(settings.polling_failure_limits, 5);
        assert_eq!(settings.probe_deadline_secs, 30);
        assert_eq!(
            settings.hard_failure_reasons.iter().cloned().collect::<Vec<_>>(),
            vec!["Boom".to_string(), "Crash".to_string()]
        );
    }
}
