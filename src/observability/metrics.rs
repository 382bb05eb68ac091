//! # Metrics
//!
//! Prometheus metrics for monitoring the initializer.
//!
//! ## Metrics Exposed
//!
//! - `vault_initializer_invocations_total{trigger}` - Invocations started
//! - `vault_initializer_trigger_rejections_total{trigger}` - Triggers rejected because an invocation was running
//! - `vault_initializer_invocation_duration_seconds{outcome}` - Duration of finished invocations
//! - `vault_initializer_connect_attempts_total` - Store connection attempts
//! - `vault_initializer_connect_failures_total` - Failed store connection attempts
//! - `vault_initializer_reconcile_attempts_total` - Reconcile attempts (one read, maybe a write)
//! - `vault_initializer_reconcile_outcomes_total{outcome}` - Terminal reconcile outcomes
//! - `vault_initializer_secret_writes_total` - Successful bundle writes
//! - `vault_initializer_store_operations_total{operation,status}` - Vault KV operations
//! - `vault_initializer_store_operation_duration_seconds{operation}` - Duration of Vault KV operations

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;
use std::time::Instant;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static INVOCATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_initializer_invocations_total",
            "Total number of invocations started, by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create INVOCATIONS_TOTAL metric - this should never happen")
});

static TRIGGER_REJECTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_initializer_trigger_rejections_total",
            "Total number of triggers rejected because an invocation was already running",
        ),
        &["trigger"],
    )
    .expect("Failed to create TRIGGER_REJECTIONS_TOTAL metric - this should never happen")
});

static INVOCATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vault_initializer_invocation_duration_seconds",
            "Duration of invocations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 240.0]),
        &["outcome"],
    )
    .expect("Failed to create INVOCATION_DURATION metric - this should never happen")
});

static CONNECT_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_initializer_connect_attempts_total",
        "Total number of store connection attempts",
    )
    .expect("Failed to create CONNECT_ATTEMPTS_TOTAL metric - this should never happen")
});

static CONNECT_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_initializer_connect_failures_total",
        "Total number of failed store connection attempts",
    )
    .expect("Failed to create CONNECT_FAILURES_TOTAL metric - this should never happen")
});

static RECONCILE_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_initializer_reconcile_attempts_total",
        "Total number of reconcile attempts",
    )
    .expect("Failed to create RECONCILE_ATTEMPTS_TOTAL metric - this should never happen")
});

static RECONCILE_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_initializer_reconcile_outcomes_total",
            "Total number of terminal reconcile outcomes",
        ),
        &["outcome"],
    )
    .expect("Failed to create RECONCILE_OUTCOMES_TOTAL metric - this should never happen")
});

static SECRET_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_initializer_secret_writes_total",
        "Total number of successful secret bundle writes",
    )
    .expect("Failed to create SECRET_WRITES_TOTAL metric - this should never happen")
});

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_initializer_store_operations_total",
            "Total number of Vault KV operations",
        ),
        &["operation", "status"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vault_initializer_store_operation_duration_seconds",
            "Duration of Vault KV operations in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_DURATION metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(INVOCATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRIGGER_REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVOCATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CONNECT_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_DURATION.clone()))?;
    Ok(())
}

/// Gather all registered metric families
#[must_use]
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_invocations(trigger: &str) {
    INVOCATIONS_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_trigger_rejections(trigger: &str) {
    TRIGGER_REJECTIONS_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn observe_invocation(outcome: &str, duration_secs: f64) {
    INVOCATION_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

pub fn increment_connect_attempts() {
    CONNECT_ATTEMPTS_TOTAL.inc();
}

pub fn increment_connect_failures() {
    CONNECT_FAILURES_TOTAL.inc();
}

pub fn increment_reconcile_attempts() {
    RECONCILE_ATTEMPTS_TOTAL.inc();
}

pub fn increment_reconcile_outcome(outcome: &str) {
    RECONCILE_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_secret_writes() {
    SECRET_WRITES_TOTAL.inc();
}

/// Record one Vault KV operation started at `start`
pub fn record_store_operation(operation: &str, status: &str, start: Instant) {
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}

#[cfg(test)]
pub(crate) fn store_operation_count(operation: &str, status: &str) -> u64 {
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .get()
}
