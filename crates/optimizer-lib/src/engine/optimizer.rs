//! Per-workload orchestration of the recommendation pipeline

use super::hysteresis::{filter_cpu, filter_memory, Decision};
use super::lookback::select_lookback;
use super::sizing::{discover_runtime, recommend, Recommendation, SizedResources, SizingContext};
use super::summary::RunSummary;
use super::target::{select_target, TargetRatio};
use crate::error::Result;
use crate::filter::{format_pairs, NameFilter};
use crate::metrics::{MetricsSource, UsageHistory};
use crate::models::{Container, ContainerResourceSpec, Workload};
use crate::observability::StructuredLogger;
use crate::policy::Policy;
use crate::quantity::{format_cpu, format_memory, ResourceKind};
use crate::store::WorkloadStore;
use crate::time::format_timestamp;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Hysteresis outcome for the three managed fields of a container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerDecision {
    pub cpu_request: Decision<f64>,
    pub memory_request: Decision<u64>,
    pub memory_limit: Decision<u64>,
}

impl ContainerDecision {
    pub fn new(current: &ContainerResourceSpec, recommended: &SizedResources, threshold: f64) -> Self {
        Self {
            cpu_request: filter_cpu(current.cpu_request, recommended.cpu_request, threshold),
            memory_request: filter_memory(current.memory_request, recommended.memory_request, threshold),
            memory_limit: filter_memory(current.memory_limit, recommended.memory_limit, threshold),
        }
    }

    /// Current values (sentinels for unset fields)
    pub fn old(&self) -> SizedResources {
        SizedResources {
            cpu_request: self.cpu_request.old,
            memory_request: self.memory_request.old,
            memory_limit: self.memory_limit.old,
        }
    }

    /// Values after hysteresis
    pub fn applied(&self) -> SizedResources {
        SizedResources {
            cpu_request: self.cpu_request.value,
            memory_request: self.memory_request.value,
            memory_limit: self.memory_limit.value,
        }
    }

    pub fn any_changed(&self) -> bool {
        self.cpu_request.changed || self.memory_request.changed || self.memory_limit.changed
    }
}

/// Apply a decision to a container's resources.
///
/// Changed fields are rewritten in `m`/`Mi` notation, unchanged fields keep
/// their original text and the CPU limit is always dropped. Returns the new
/// container and whether anything differs from the input.
pub fn optimize_container(container: &Container, decision: &ContainerDecision) -> (Container, bool) {
    let mut updated = container.clone();
    let resources = &mut updated.resources;
    let cpu = ResourceKind::Cpu.key().to_string();
    let memory = ResourceKind::Memory.key().to_string();

    if decision.cpu_request.changed {
        resources
            .requests
            .insert(cpu.clone(), format_cpu(decision.cpu_request.value));
    }
    if decision.memory_request.changed {
        resources
            .requests
            .insert(memory.clone(), format_memory(decision.memory_request.value));
    }
    if decision.memory_limit.changed {
        resources
            .limits
            .insert(memory, format_memory(decision.memory_limit.value));
    }
    let dropped_cpu_limit = resources.limits.remove(&cpu).is_some();

    (updated, decision.any_changed() || dropped_cpu_limit)
}

/// Result of sizing one container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPlan {
    pub name: String,
    pub recommendation: Recommendation,
    pub decision: ContainerDecision,
    pub changed: bool,
}

/// Result of sizing a workload; `workload` carries the new resources
#[derive(Debug, Clone)]
pub struct WorkloadPlan {
    pub workload: Workload,
    pub changed: bool,
    pub lookback_minutes: i64,
    pub target: TargetRatio,
    pub containers: Vec<ContainerPlan>,
    pub summary: RunSummary,
}

/// Sizes the containers of workloads from their usage history
pub struct Optimizer<'a> {
    policy: &'a Policy,
    metrics: &'a dyn MetricsSource,
    store: &'a dyn WorkloadStore,
    logger: StructuredLogger,
}

impl<'a> Optimizer<'a> {
    pub fn new(policy: &'a Policy, metrics: &'a dyn MetricsSource, store: &'a dyn WorkloadStore) -> Self {
        Self {
            policy,
            metrics,
            store,
            logger: StructuredLogger::new(false),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    fn history(&self) -> UsageHistory<'_> {
        UsageHistory::new(self.metrics, &self.policy.workload_type)
    }

    /// Size every container of `workload` matching the filter.
    ///
    /// Gating and data errors propagate; the caller skips the workload.
    /// When a container changed, the returned workload is stamped with the
    /// previous resource map and the update time.
    pub async fn optimize_workload(
        &self,
        workload: &Workload,
        filter: &NameFilter,
        now: DateTime<Utc>,
    ) -> Result<WorkloadPlan> {
        info!(namespace = %workload.namespace, workload = %workload.name, "Optimizing workload");
        let history = self.history();

        let lookback_minutes = select_lookback(workload, self.policy, &history, now).await?;
        let autoscaler = self
            .store
            .get_autoscaler_for(&workload.namespace, &workload.name)
            .await?;
        let target = select_target(
            workload,
            autoscaler.as_ref(),
            &history,
            lookback_minutes,
            self.policy,
        )
        .await?;

        let mut updated = workload.clone();
        let mut containers = Vec::new();
        let mut summary = RunSummary::default();

        for slot in updated.containers.iter_mut() {
            if !filter.matches_container(&slot.name) {
                debug!(container = %slot.name, "Skipping container not matching pattern");
                continue;
            }

            let plan = self
                .size_container(workload, slot, target, lookback_minutes, &history)
                .await?;
            let (container, changed) = optimize_container(slot, &plan.decision);
            summary.record(&plan.decision.old(), &plan.decision.applied(), workload.replicas);

            debug!(
                container = %container.name,
                requests = %format_pairs(&container.resources.requests),
                limits = %format_pairs(&container.resources.limits),
                "New container resources"
            );
            *slot = container;
            containers.push(ContainerPlan { changed, ..plan });
        }

        let changed = containers.iter().any(|c| c.changed);
        if changed {
            let old_resources = serde_json::to_string(&workload.resource_map())?;
            updated
                .annotations
                .insert(self.policy.old_resources_annotation(), old_resources);
            updated
                .annotations
                .insert(self.policy.last_update_annotation(), format_timestamp(now));
        }

        Ok(WorkloadPlan {
            workload: updated,
            changed,
            lookback_minutes,
            target,
            containers,
            summary,
        })
    }

    async fn size_container(
        &self,
        workload: &Workload,
        container: &Container,
        target: TargetRatio,
        lookback_minutes: i64,
        history: &UsageHistory<'_>,
    ) -> Result<ContainerPlan> {
        info!(
            namespace = %workload.namespace,
            workload = %workload.name,
            container = %container.name,
            "Processing container"
        );

        let current = ContainerResourceSpec::from_requirements(&container.resources)?;
        let mut ctx = SizingContext::new(
            &workload.namespace,
            &workload.name,
            &container.name,
            target,
            self.policy,
        )
        .with_lookback(lookback_minutes);
        ctx.runtime = discover_runtime(history, &ctx).await?;

        let recommendation = recommend(history, &ctx, self.policy).await?;
        let decision = ContainerDecision::new(&current, &recommendation.resources, self.policy.change_threshold);
        self.log_decision(workload, &container.name, &decision);

        Ok(ContainerPlan {
            name: container.name.clone(),
            recommendation,
            decision,
            changed: decision.any_changed(),
        })
    }

    fn log_decision(&self, workload: &Workload, container: &str, decision: &ContainerDecision) {
        let fields = [
            (
                "CPU requests",
                format_cpu(decision.cpu_request.old),
                format_cpu(decision.cpu_request.value),
                decision.cpu_request.diff_pct,
                decision.cpu_request.changed,
            ),
            (
                "Memory requests",
                format_memory(decision.memory_request.old),
                format_memory(decision.memory_request.value),
                decision.memory_request.diff_pct,
                decision.memory_request.changed,
            ),
            (
                "Memory limits",
                format_memory(decision.memory_limit.old),
                format_memory(decision.memory_limit.value),
                decision.memory_limit.diff_pct,
                decision.memory_limit.changed,
            ),
        ];
        for (field, old, new, diff_pct, changed) in fields {
            self.logger.log_field(
                &workload.namespace,
                &workload.name,
                container,
                field,
                &old,
                &new,
                diff_pct,
                changed,
            );
        }
    }
}
