//! Quantile, target ratio and replica selection for autoscaled workloads

use crate::error::Result;
use crate::metrics::UsageHistory;
use crate::models::{Autoscaler, Workload};
use crate::policy::Policy;
use crate::quantity::ResourceKind;
use tracing::info;

/// Sizing parameters shared by all containers of a workload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRatio {
    /// Multiplier on CPU usage
    pub cpu: f64,
    /// Multiplier on memory usage
    pub memory: f64,
    pub quantile_cpu: f64,
    pub quantile_memory: f64,
    /// Replica count the summed CPU usage is divided by
    pub target_replicas: i32,
}

impl TargetRatio {
    /// Parameters for a workload without autoscaler
    pub fn static_defaults(replicas: i32, policy: &Policy) -> Self {
        Self {
            cpu: 1.0,
            memory: 1.0,
            quantile_cpu: policy.default_quantile_cpu,
            quantile_memory: policy.default_quantile_memory,
            target_replicas: replicas.max(1),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Replicas to size for: a fraction of the autoscaler's max, within its band
pub fn target_replicas(autoscaler: &Autoscaler, policy: &Policy) -> i32 {
    let wanted = (autoscaler.max_replicas as f64 * policy.hpa_target_replicas_ratio).round() as i32;
    wanted
        .max(autoscaler.min_replicas)
        .min(autoscaler.max_replicas)
        .max(1)
}

/// Derive ratios and quantiles from an autoscaler and the observed replica count
pub fn hpa_target_ratio(
    autoscaler: &Autoscaler,
    replica_history: f64,
    replicas: i32,
    policy: &Policy,
) -> TargetRatio {
    let mut target = TargetRatio::static_defaults(replicas, policy);
    target.target_replicas = target_replicas(autoscaler, policy);

    for metric in &autoscaler.metrics {
        let ratio = match metric.target_utilization {
            Some(utilization) if utilization > 0 => round_to(100.0 / utilization as f64, 2),
            _ => continue,
        };
        match metric.resource {
            ResourceKind::Cpu => {
                target.cpu = ratio;
                target.quantile_cpu = policy.hpa_quantile_cpu;
            }
            ResourceKind::Memory => {
                target.memory = ratio;
                target.quantile_memory = policy.hpa_quantile_memory;
            }
        }
    }

    let history = replica_history.round();
    let min = autoscaler.min_replicas as f64;
    let range = (autoscaler.max_replicas - autoscaler.min_replicas) as f64;
    let addon = if history > min && range > 0.0 {
        round_to((history - min) / range, 2)
    } else {
        0.0
    };

    // Near the top of the band: move towards the ceiling, never above it
    if addon > 0.5 {
        let pressured = (1.0 + addon).min(policy.hpa_max_target_ratio);
        target.cpu = round_to(target.cpu.max(pressured), 3);
    }

    target
}

/// Target ratio for a workload, reading replica history when autoscaled
pub async fn select_target(
    workload: &Workload,
    autoscaler: Option<&Autoscaler>,
    history: &UsageHistory<'_>,
    lookback_minutes: i64,
    policy: &Policy,
) -> Result<TargetRatio> {
    let Some(autoscaler) = autoscaler else {
        return Ok(TargetRatio::static_defaults(workload.replicas, policy));
    };

    let replica_history = history
        .replica_history(
            &workload.namespace,
            &workload.name,
            lookback_minutes,
            policy.default_quantile_cpu,
        )
        .await?;
    let target = hpa_target_ratio(autoscaler, replica_history, workload.replicas, policy);

    info!(
        namespace = %workload.namespace,
        workload = %workload.name,
        autoscaler = %autoscaler.name,
        min_replicas = autoscaler.min_replicas,
        max_replicas = autoscaler.max_replicas,
        replica_history,
        target_ratio_cpu = target.cpu,
        target_ratio_memory = target.memory,
        target_replicas = target.target_replicas,
        "Using autoscaler-aware target ratio"
    );
    Ok(target)
}
