//! Target CPU request, memory request and memory limit

use super::target::TargetRatio;
use super::trend::estimate_trend;
use crate::error::Result;
use crate::metrics::{UsageHistory, Window};
use crate::policy::Policy;
use crate::quantity::ResourceKind;
use tracing::debug;

/// Runtime classification of a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeHint {
    #[default]
    Standard,
    /// Cannot use more than one core (e.g. Node.js)
    Constrained,
}

/// Per-container parameters for one sizing pass
#[derive(Debug, Clone, PartialEq)]
pub struct SizingContext {
    pub namespace: String,
    pub workload: String,
    pub workload_type: String,
    pub container: String,
    pub target: TargetRatio,
    pub lookback_minutes: i64,
    pub offset_minutes: i64,
    pub runtime: RuntimeHint,
}

impl SizingContext {
    pub fn new(
        namespace: impl Into<String>,
        workload: impl Into<String>,
        container: impl Into<String>,
        target: TargetRatio,
        policy: &Policy,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workload: workload.into(),
            workload_type: policy.workload_type.clone(),
            container: container.into(),
            target,
            lookback_minutes: policy.default_lookback_minutes,
            offset_minutes: 0,
            runtime: RuntimeHint::Standard,
        }
    }

    pub fn with_lookback(mut self, lookback_minutes: i64) -> Self {
        self.lookback_minutes = lookback_minutes;
        self
    }

    pub fn window(&self) -> Window {
        Window::new(self.lookback_minutes).with_offset(self.offset_minutes)
    }
}

/// CPU cores and memory bytes of one container
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizedResources {
    pub cpu_request: f64,
    pub memory_request: u64,
    pub memory_limit: u64,
}

/// Sized values plus the signals that produced them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recommendation {
    pub resources: SizedResources,
    pub cpu_trend: f64,
    pub memory_trend: f64,
    pub oom_kills: u64,
    pub runtime: RuntimeHint,
}

/// Clamp that maps NaN to the lower bound
fn bounded(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Memory quantile, widened once OOM kills were observed
pub fn memory_quantile(base: f64, oom_kills: u64, policy: &Policy) -> f64 {
    if oom_kills > 0 {
        base.max(policy.oom_quantile)
    } else {
        base
    }
}

pub fn cpu_request(
    summed_usage: f64,
    target_replicas: i32,
    trend: f64,
    target_ratio: f64,
    runtime: RuntimeHint,
    policy: &Policy,
) -> f64 {
    let per_replica = summed_usage / target_replicas.max(1) as f64;
    let raw = per_replica * trend * policy.cpu_request_ratio * target_ratio;
    let cores = bounded(raw, policy.min_cpu_request, policy.max_cpu_request);
    let cores = (cores * 1000.0).round() / 1000.0;

    match runtime {
        RuntimeHint::Constrained => cores.min(policy.max_cpu_request_constrained),
        RuntimeHint::Standard => cores,
    }
}

pub fn memory_request(usage: f64, trend: f64, target_ratio: f64, oom_kills: u64, policy: &Policy) -> u64 {
    let oom_ratio = if oom_kills > 0 { policy.oom_request_ratio } else { 1.0 };
    let raw = usage * trend * oom_ratio * policy.memory_request_ratio * target_ratio;
    bounded(
        raw,
        policy.min_memory_request as f64,
        policy.max_memory_request as f64,
    )
    .round() as u64
}

pub fn memory_limit(max_usage: f64, trend: f64, oom_kills: u64, policy: &Policy) -> u64 {
    let oom_ratio = if oom_kills > 0 { policy.oom_limit_ratio } else { 1.0 };
    let raw = max_usage * trend * oom_ratio * policy.memory_limit_ratio;
    bounded(
        raw,
        policy.min_memory_limit as f64,
        policy.max_memory_limit as f64,
    )
    .round() as u64
}

/// Detect the runtime of the container behind `ctx`
pub async fn discover_runtime(history: &UsageHistory<'_>, ctx: &SizingContext) -> Result<RuntimeHint> {
    let constrained = history
        .is_constrained_runtime(&ctx.namespace, &ctx.workload, &ctx.container)
        .await?;
    Ok(if constrained {
        RuntimeHint::Constrained
    } else {
        RuntimeHint::Standard
    })
}

/// Fetch every signal for a container and size it
pub async fn recommend(
    history: &UsageHistory<'_>,
    ctx: &SizingContext,
    policy: &Policy,
) -> Result<Recommendation> {
    let (namespace, workload, container) = (&ctx.namespace, &ctx.workload, &ctx.container);

    let oom_kills = history
        .oom_kills(namespace, workload, container, ctx.lookback_minutes)
        .await?;
    let cpu_trend = estimate_trend(history, ResourceKind::Cpu, namespace, workload, container, policy).await?;
    let memory_trend =
        estimate_trend(history, ResourceKind::Memory, namespace, workload, container, policy).await?;

    let cpu_usage = history
        .cpu_usage(namespace, workload, container, ctx.target.quantile_cpu, ctx.window())
        .await?;
    let quantile = memory_quantile(ctx.target.quantile_memory, oom_kills, policy);
    let memory_usage = history
        .memory_usage(namespace, workload, container, quantile, ctx.window())
        .await?;

    debug!(
        namespace = %namespace,
        workload = %workload,
        container = %container,
        cpu_usage,
        memory_usage,
        oom_kills,
        "Fetched usage history"
    );

    let resources = SizedResources {
        cpu_request: cpu_request(
            cpu_usage,
            ctx.target.target_replicas,
            cpu_trend,
            ctx.target.cpu,
            ctx.runtime,
            policy,
        ),
        memory_request: memory_request(memory_usage, memory_trend, ctx.target.memory, oom_kills, policy),
        memory_limit: memory_limit(memory_usage, memory_trend, oom_kills, policy),
    };

    Ok(Recommendation {
        resources,
        cpu_trend,
        memory_trend,
        oom_kills,
        runtime: ctx.runtime,
    })
}
