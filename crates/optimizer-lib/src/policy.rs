//! Optimizer policy: thresholds, ratios and bounds
//!
//! Loaded once at startup and passed by reference into every component.
//! Memory values accept either a byte count or a quantity string (`16Mi`).

use crate::error::{OptimizerError, Result};
use crate::quantity::{parse_memory, GIB, MIB};
use serde::{Deserialize, Deserializer, Serialize};

/// Default lookback when nothing narrows it down (7 days)
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60 * 24 * 7;

/// Thresholds and knobs for the recommendation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Workloads younger than this are not optimized
    pub create_age_threshold_minutes: i64,
    /// Workloads optimized more recently than this are left alone
    pub update_age_threshold_minutes: i64,
    /// Minimum lookback window and minimum number of history samples
    pub min_lookback_minutes: i64,
    pub max_lookback_minutes: i64,
    /// Subtracted from the last-update age so the window excludes the rollout
    pub offset_lookback_minutes: i64,
    pub default_lookback_minutes: i64,

    pub default_quantile_cpu: f64,
    pub default_quantile_memory: f64,
    /// Quantiles used for resources an autoscaler already reacts to
    pub hpa_quantile_cpu: f64,
    pub hpa_quantile_memory: f64,
    /// Fraction of the autoscaler's max replicas to size for
    pub hpa_target_replicas_ratio: f64,
    /// Upper bound for the autoscaler-derived CPU target ratio
    pub hpa_max_target_ratio: f64,

    pub min_cpu_request: f64,
    pub max_cpu_request: f64,
    /// Cap for runtimes that cannot use more than one core
    pub max_cpu_request_constrained: f64,
    #[serde(deserialize_with = "deserialize_bytes")]
    pub min_memory_request: u64,
    #[serde(deserialize_with = "deserialize_bytes")]
    pub max_memory_request: u64,
    #[serde(deserialize_with = "deserialize_bytes")]
    pub min_memory_limit: u64,
    #[serde(deserialize_with = "deserialize_bytes")]
    pub max_memory_limit: u64,

    pub cpu_request_ratio: f64,
    pub memory_request_ratio: f64,
    pub memory_limit_ratio: f64,

    /// Quantile used for memory once OOM kills were observed
    pub oom_quantile: f64,
    pub oom_request_ratio: f64,
    pub oom_limit_ratio: f64,

    /// Relative change below which a recommendation is discarded
    pub change_threshold: f64,

    pub trend_enabled: bool,
    pub trend_lookback_minutes: i64,
    pub trend_offset_minutes: i64,
    pub trend_quantile: f64,
    pub trend_min_ratio: f64,
    pub trend_max_ratio: f64,

    pub workload_type: String,
    /// Domain used for the old-resources and last-update annotations
    pub annotation_prefix: String,
    /// Pause between workload writes
    pub write_delay_ms: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            create_age_threshold_minutes: 60,
            update_age_threshold_minutes: 60,
            min_lookback_minutes: 5,
            max_lookback_minutes: 60 * 24 * 30,
            offset_lookback_minutes: 5,
            default_lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
            default_quantile_cpu: 0.95,
            default_quantile_memory: 0.95,
            hpa_quantile_cpu: 0.8,
            hpa_quantile_memory: 0.8,
            hpa_target_replicas_ratio: 0.5,
            hpa_max_target_ratio: 2.0,
            min_cpu_request: 0.001,
            max_cpu_request: 16.0,
            max_cpu_request_constrained: 1.0,
            min_memory_request: 16 * MIB,
            max_memory_request: 16 * GIB,
            min_memory_limit: 128 * MIB,
            max_memory_limit: 32 * GIB,
            cpu_request_ratio: 1.0,
            memory_request_ratio: 1.0,
            memory_limit_ratio: 1.5,
            oom_quantile: 0.99,
            oom_request_ratio: 1.5,
            oom_limit_ratio: 2.0,
            change_threshold: 0.1,
            trend_enabled: true,
            trend_lookback_minutes: 60,
            trend_offset_minutes: DEFAULT_LOOKBACK_MINUTES,
            trend_quantile: 0.8,
            trend_min_ratio: 0.5,
            trend_max_ratio: 1.5,
            workload_type: "deployment".to_string(),
            annotation_prefix: "k8s-optimizer.io".to_string(),
            write_delay_ms: 0,
        }
    }
}

impl Policy {
    /// Annotation holding the JSON resource map from before the last update
    pub fn old_resources_annotation(&self) -> String {
        format!("{}/old-resources", self.annotation_prefix)
    }

    /// Annotation holding the RFC 3339 time of the last update
    pub fn last_update_annotation(&self) -> String {
        format!("{}/last-update", self.annotation_prefix)
    }

    /// Reject inconsistent settings before any workload is touched
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> Result<()> {
            Err(OptimizerError::InvalidPolicy(message))
        }

        // NaN slips through every ordered comparison below
        for (name, value) in [
            ("default_quantile_cpu", self.default_quantile_cpu),
            ("default_quantile_memory", self.default_quantile_memory),
            ("hpa_quantile_cpu", self.hpa_quantile_cpu),
            ("hpa_quantile_memory", self.hpa_quantile_memory),
            ("hpa_target_replicas_ratio", self.hpa_target_replicas_ratio),
            ("hpa_max_target_ratio", self.hpa_max_target_ratio),
            ("min_cpu_request", self.min_cpu_request),
            ("max_cpu_request", self.max_cpu_request),
            ("max_cpu_request_constrained", self.max_cpu_request_constrained),
            ("cpu_request_ratio", self.cpu_request_ratio),
            ("memory_request_ratio", self.memory_request_ratio),
            ("memory_limit_ratio", self.memory_limit_ratio),
            ("oom_quantile", self.oom_quantile),
            ("oom_request_ratio", self.oom_request_ratio),
            ("oom_limit_ratio", self.oom_limit_ratio),
            ("change_threshold", self.change_threshold),
            ("trend_quantile", self.trend_quantile),
            ("trend_min_ratio", self.trend_min_ratio),
            ("trend_max_ratio", self.trend_max_ratio),
        ] {
            if !value.is_finite() {
                return invalid(format!("{} {} must be a finite number", name, value));
            }
        }

        if self.min_cpu_request <= 0.0 || self.min_cpu_request > self.max_cpu_request {
            return invalid(format!(
                "cpu request bounds [{}, {}] are invalid",
                self.min_cpu_request, self.max_cpu_request
            ));
        }
        if self.max_cpu_request_constrained < self.min_cpu_request {
            return invalid(format!(
                "constrained cpu cap {} is below the minimum cpu request {}",
                self.max_cpu_request_constrained, self.min_cpu_request
            ));
        }
        if self.min_memory_request == 0 || self.min_memory_request > self.max_memory_request {
            return invalid(format!(
                "memory request bounds [{}, {}] are invalid",
                self.min_memory_request, self.max_memory_request
            ));
        }
        if self.min_memory_limit == 0 || self.min_memory_limit > self.max_memory_limit {
            return invalid(format!(
                "memory limit bounds [{}, {}] are invalid",
                self.min_memory_limit, self.max_memory_limit
            ));
        }
        if self.trend_min_ratio <= 0.0 || self.trend_min_ratio > self.trend_max_ratio {
            return invalid(format!(
                "trend bounds [{}, {}] are invalid",
                self.trend_min_ratio, self.trend_max_ratio
            ));
        }
        if self.min_lookback_minutes <= 0 || self.min_lookback_minutes > self.max_lookback_minutes {
            return invalid(format!(
                "lookback bounds [{}, {}] are invalid",
                self.min_lookback_minutes, self.max_lookback_minutes
            ));
        }
        if !(0.0..1.0).contains(&self.change_threshold) {
            return invalid(format!("change threshold {} must be in [0, 1)", self.change_threshold));
        }
        if !(0.0..=1.0).contains(&self.hpa_target_replicas_ratio) {
            return invalid(format!(
                "hpa target replicas ratio {} must be in [0, 1]",
                self.hpa_target_replicas_ratio
            ));
        }

        for (name, quantile) in [
            ("default_quantile_cpu", self.default_quantile_cpu),
            ("default_quantile_memory", self.default_quantile_memory),
            ("hpa_quantile_cpu", self.hpa_quantile_cpu),
            ("hpa_quantile_memory", self.hpa_quantile_memory),
            ("oom_quantile", self.oom_quantile),
            ("trend_quantile", self.trend_quantile),
        ] {
            if quantile <= 0.0 || quantile > 1.0 {
                return invalid(format!("{} {} must be in (0, 1]", name, quantile));
            }
        }

        for (name, ratio) in [
            ("cpu_request_ratio", self.cpu_request_ratio),
            ("memory_request_ratio", self.memory_request_ratio),
            ("memory_limit_ratio", self.memory_limit_ratio),
            ("oom_request_ratio", self.oom_request_ratio),
            ("oom_limit_ratio", self.oom_limit_ratio),
            ("hpa_max_target_ratio", self.hpa_max_target_ratio),
        ] {
            if ratio <= 0.0 {
                return invalid(format!("{} {} must be positive", name, ratio));
            }
        }

        Ok(())
    }
}

fn deserialize_bytes<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bytes {
        Count(u64),
        Quantity(String),
    }

    match Bytes::deserialize(deserializer)? {
        Bytes::Count(count) => Ok(count),
        Bytes::Quantity(text) => parse_memory(&text).map_err(serde::de::Error::custom),
    }
}
