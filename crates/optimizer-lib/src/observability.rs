//! Observability infrastructure for the optimizer
//!
//! Provides:
//! - Prometheus metrics (workload outcomes, query latency, last-run totals)
//! - Structured logging of decisions with tracing

use crate::engine::RunSummary;
use crate::error::OptimizerError;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge, GaugeVec,
    Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for metrics-source query latency (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    workloads_total: IntCounterVec,
    query_latency_seconds: Histogram,
    last_run_resources: GaugeVec,
    last_run_timestamp_seconds: IntGauge,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            workloads_total: register_int_counter_vec!(
                "k8s_optimizer_workloads_total",
                "Workloads processed, by outcome",
                &["outcome"]
            )
            .expect("Failed to register workloads_total"),

            query_latency_seconds: register_histogram!(
                "k8s_optimizer_query_latency_seconds",
                "Time spent waiting for metrics-source queries",
                QUERY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            last_run_resources: register_gauge_vec!(
                "k8s_optimizer_last_run_resources",
                "Replica-weighted resource totals of the last run (cores or bytes)",
                &["resource", "state"]
            )
            .expect("Failed to register last_run_resources"),

            last_run_timestamp_seconds: register_int_gauge!(
                "k8s_optimizer_last_run_timestamp_seconds",
                "Unix time the last run finished"
            )
            .expect("Failed to register last_run_timestamp_seconds"),
        }
    }
}

/// Handle to the process-wide optimizer metrics; clones share the registry
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new)
    }

    pub fn observe_query_latency(&self, duration_secs: f64) {
        self.inner().query_latency_seconds.observe(duration_secs);
    }

    /// Count a workload outcome (`updated`, `unchanged`, `skipped`, `failed`)
    pub fn inc_workloads(&self, outcome: &str) {
        self.inner()
            .workloads_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn workloads(&self, outcome: &str) -> u64 {
        self.inner()
            .workloads_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Publish the totals of a finished run
    pub fn set_last_run(&self, summary: &RunSummary, finished_at: i64) {
        let gauges = &self.inner().last_run_resources;
        for (resource, old, new) in [
            ("cpu_request", summary.old_cpu, summary.new_cpu),
            ("memory_request", summary.old_memory_request, summary.new_memory_request),
            ("memory_limit", summary.old_memory_limit, summary.new_memory_limit),
        ] {
            gauges.with_label_values(&[resource, "old"]).set(old);
            gauges.with_label_values(&[resource, "new"]).set(new);
        }
        self.inner().last_run_timestamp_seconds.set(finished_at);
    }
}

/// Structured logger for optimizer events
#[derive(Clone)]
pub struct StructuredLogger {
    dry_run: bool,
}

impl StructuredLogger {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Log a single resource field decision of a container
    #[allow(clippy::too_many_arguments)]
    pub fn log_field(
        &self,
        namespace: &str,
        workload: &str,
        container: &str,
        field: &str,
        old: &str,
        new: &str,
        diff_pct: i64,
        changed: bool,
    ) {
        if changed {
            info!(
                event = "resource_changed",
                namespace = %namespace,
                workload = %workload,
                container = %container,
                field = %field,
                old = %old,
                new = %new,
                diff_pct = diff_pct,
                "{} change: {} -> {} ({}%)",
                field,
                old,
                new,
                diff_pct
            );
        } else {
            info!(
                event = "resource_unchanged",
                namespace = %namespace,
                workload = %workload,
                container = %container,
                field = %field,
                diff_pct = diff_pct,
                "{} change is too small: {}%",
                field,
                diff_pct
            );
        }
    }

    /// Log a workload that was written (or would have been in dry-run mode)
    pub fn log_update(&self, namespace: &str, workload: &str) {
        info!(
            event = "workload_updated",
            namespace = %namespace,
            workload = %workload,
            dry_run = self.dry_run,
            "Updating workload{}",
            if self.dry_run { " (dry-run)" } else { "" }
        );
    }

    /// Log a skipped workload; gating outcomes are routine
    pub fn log_skip(&self, namespace: &str, workload: &str, error: &OptimizerError) {
        if error.is_gating() {
            info!(
                event = "workload_skipped",
                namespace = %namespace,
                workload = %workload,
                reason = %error,
                "Skipping workload"
            );
        } else {
            warn!(
                event = "workload_failed",
                namespace = %namespace,
                workload = %workload,
                error = %error,
                "Failed to optimize workload"
            );
        }
    }

    pub fn log_summary(&self, summary: &RunSummary) {
        for line in summary.report_lines() {
            info!(event = "run_summary", dry_run = self.dry_run, "{}", line);
        }
    }

    pub fn log_startup(&self, version: &str, prometheus_url: &str) {
        info!(
            event = "optimizer_started",
            version = %version,
            prometheus_url = %prometheus_url,
            dry_run = self.dry_run,
            "Resource optimizer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "optimizer_shutdown",
            reason = %reason,
            "Resource optimizer shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_metrics() {
        let metrics = OptimizerMetrics::new();
        let before = metrics.workloads("observability_test");

        metrics.inc_workloads("observability_test");
        metrics.observe_query_latency(0.02);
        metrics.set_last_run(&RunSummary::default(), 1_700_000_000);

        assert_eq!(metrics.workloads("observability_test"), before + 1);
        // Clones share the same registry
        let other = metrics.clone();
        other.inc_workloads("observability_test");
        assert_eq!(metrics.workloads("observability_test"), before + 2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new(true);
        assert!(logger.dry_run);
        logger.log_skip(
            "shop",
            "web",
            &OptimizerError::TooYoung {
                age_minutes: 10,
                threshold: 60,
            },
        );
    }
}
