//! Resource recommendation engine
//!
//! Turns a workload's current container resources and its usage history
//! into new requests and limits:
//! lookback gate -> target ratio -> trend + sizing -> hysteresis -> summary.

mod hysteresis;
mod lookback;
mod optimizer;
mod sizing;
mod summary;
mod target;
mod trend;

#[cfg(test)]
mod tests;

pub use hysteresis::{diff_percent, filter_cpu, filter_memory, Decision, CPU_SENTINEL, MEMORY_SENTINEL};
pub use lookback::{bound_lookback, candidate_lookback, select_lookback};
pub use optimizer::{optimize_container, ContainerDecision, ContainerPlan, Optimizer, WorkloadPlan};
pub use sizing::{
    cpu_request, discover_runtime, memory_limit, memory_quantile, memory_request, recommend,
    Recommendation, RuntimeHint, SizedResources, SizingContext,
};
pub use summary::{percent_change, RunSummary};
pub use target::{hpa_target_ratio, select_target, target_replicas, TargetRatio};
pub use trend::{bound_trend, estimate_trend};
