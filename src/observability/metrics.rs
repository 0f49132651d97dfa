//! # Metrics
//!
//! Prometheus metrics of the deployment core.
//!
//! ## Metrics Exposed
//!
//! - `cnative_deploys_created_total` - Deploys created
//! - `cnative_deploys_finished_total{status}` - Deploys that reached a final status
//! - `cnative_deploy_duration_seconds` - Time from deploy creation to final status
//! - `cnative_poll_probes_total` - Status probes executed
//! - `cnative_poll_probe_errors_total` - Status probes that failed or observed an error
//! - `cnative_apply_conflicts_total` - 409 Conflict answers while applying resources
//! - `cnative_apiserver_failovers_total{cluster}` - API server endpoints skipped as unreachable
//! - `cnative_watch_streams_open` - Process watch streams currently open
//! - `cnative_domain_reconciliations_total{outcome}` - DomainGroupMapping reconciliations
//! - `cnative_image_deletions_total{result}` - Registry image deletions

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static DEPLOYS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cnative_deploys_created_total", "Total number of deploys created")
        .expect("Failed to create DEPLOYS_CREATED_TOTAL metric - this should never happen")
});

static DEPLOYS_FINISHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cnative_deploys_finished_total",
            "Total number of deploys that reached a final status",
        ),
        &["status"],
    )
    .expect("Failed to create DEPLOYS_FINISHED_TOTAL metric - this should never happen")
});

static DEPLOY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "cnative_deploy_duration_seconds",
            "Time from deploy creation to final status in seconds",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]),
    )
    .expect("Failed to create DEPLOY_DURATION metric - this should never happen")
});

static POLL_PROBES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cnative_poll_probes_total", "Total number of status probes")
        .expect("Failed to create POLL_PROBES_TOTAL metric - this should never happen")
});

static POLL_PROBE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cnative_poll_probe_errors_total",
        "Total number of status probes that failed or observed an error",
    )
    .expect("Failed to create POLL_PROBE_ERRORS_TOTAL metric - this should never happen")
});

static APPLY_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cnative_apply_conflicts_total",
        "Total number of 409 Conflict answers while applying resources",
    )
    .expect("Failed to create APPLY_CONFLICTS_TOTAL metric - this should never happen")
});

static APISERVER_FAILOVERS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cnative_apiserver_failovers_total",
            "Total number of API server endpoints skipped as unreachable",
        ),
        &["cluster"],
    )
    .expect("Failed to create APISERVER_FAILOVERS_TOTAL metric - this should never happen")
});

static WATCH_STREAMS_OPEN: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "cnative_watch_streams_open",
        "Number of process watch streams currently open",
    )
    .expect("Failed to create WATCH_STREAMS_OPEN metric - this should never happen")
});

static DOMAIN_RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cnative_domain_reconciliations_total",
            "Total number of DomainGroupMapping reconciliations",
        ),
        &["outcome"],
    )
    .expect("Failed to create DOMAIN_RECONCILIATIONS_TOTAL metric - this should never happen")
});

static IMAGE_DELETIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cnative_image_deletions_total",
            "Total number of registry image deletions",
        ),
        &["result"],
    )
    .expect("Failed to create IMAGE_DELETIONS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(DEPLOYS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPLOYS_FINISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPLOY_DURATION.clone()))?;
    REGISTRY.register(Box::new(POLL_PROBES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_PROBE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APPLY_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APISERVER_FAILOVERS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_STREAMS_OPEN.clone()))?;
    REGISTRY.register(Box::new(DOMAIN_RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IMAGE_DELETIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_deploys_created() {
    DEPLOYS_CREATED_TOTAL.inc();
}

pub fn increment_deploys_finished(status: &str) {
    DEPLOYS_FINISHED_TOTAL.with_label_values(&[status]).inc();
}

pub fn observe_deploy_duration(seconds: f64) {
    DEPLOY_DURATION.observe(seconds);
}

pub fn increment_poll_probes() {
    POLL_PROBES_TOTAL.inc();
}

pub fn increment_poll_probe_errors() {
    POLL_PROBE_ERRORS_TOTAL.inc();
}

pub fn increment_apply_conflicts() {
    APPLY_CONFLICTS_TOTAL.inc();
}

pub fn increment_apiserver_failovers(cluster: &str) {
    APISERVER_FAILOVERS_TOTAL.with_label_values(&[cluster]).inc();
}

pub fn watch_stream_opened() {
    WATCH_STREAMS_OPEN.inc();
}

pub fn watch_stream_closed() {
    WATCH_STREAMS_OPEN.dec();
}

pub fn increment_domain_reconciliations(outcome: &str) {
    DOMAIN_RECONCILIATIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

pub fn increment_image_deletions(result: &str) {
    IMAGE_DELETIONS_TOTAL.with_label_values(&[result]).inc();
}
