//! Batch runs over all selected workloads

use crate::engine::{Optimizer, RunSummary};
use crate::error::Result;
use crate::filter::NameFilter;
use crate::metrics::MetricsSource;
use crate::models::Workload;
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::policy::Policy;
use crate::store::WorkloadStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What happened to one workload during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkloadOutcome {
    Updated,
    Unchanged,
    /// Not optimized; `gating` marks routine eligibility outcomes
    Skipped { reason: String, gating: bool },
}

impl WorkloadOutcome {
    /// Label used for the outcome counter
    pub fn label(&self) -> &'static str {
        match self {
            WorkloadOutcome::Updated => "updated",
            WorkloadOutcome::Unchanged => "unchanged",
            WorkloadOutcome::Skipped { gating: true, .. } => "skipped",
            WorkloadOutcome::Skipped { gating: false, .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadReport {
    pub namespace: String,
    pub workload: String,
    #[serde(flatten)]
    pub outcome: WorkloadOutcome,
}

/// Totals and per-workload outcomes of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub workloads: Vec<WorkloadReport>,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.workloads
            .iter()
            .filter(|w| w.outcome.label() == label)
            .count()
    }

    pub fn updated(&self) -> usize {
        self.count("updated")
    }

    pub fn unchanged(&self) -> usize {
        self.count("unchanged")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// Walks namespaces and workloads, optimizing and persisting each one
pub struct Runner {
    policy: Policy,
    metrics: Arc<dyn MetricsSource>,
    store: Arc<dyn WorkloadStore>,
    only_running: bool,
    observability: OptimizerMetrics,
}

impl Runner {
    pub fn new(policy: Policy, metrics: Arc<dyn MetricsSource>, store: Arc<dyn WorkloadStore>) -> Self {
        Self {
            policy,
            metrics,
            store,
            only_running: true,
            observability: OptimizerMetrics::new(),
        }
    }

    /// Also consider workloads scaled to zero
    pub fn with_only_running(mut self, only_running: bool) -> Self {
        self.only_running = only_running;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Optimize every selected workload; per-workload failures never abort the run
    pub async fn run(&self, filter: &NameFilter, dry_run: bool) -> Result<RunReport> {
        let started_at = Utc::now();
        let logger = StructuredLogger::new(dry_run);
        let optimizer = Optimizer::new(&self.policy, self.metrics.as_ref(), self.store.as_ref())
            .with_logger(logger.clone());

        let mut summary = RunSummary::default();
        let mut workloads = Vec::new();

        for namespace in self.store.list_namespaces(filter).await? {
            let candidates = match self
                .store
                .list_workloads(&namespace, filter, self.only_running)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Failed to list workloads");
                    continue;
                }
            };

            for workload in candidates {
                let outcome = self
                    .process(&optimizer, &logger, &workload, filter, dry_run, &mut summary)
                    .await;
                self.observability.inc_workloads(outcome.label());
                workloads.push(WorkloadReport {
                    namespace: workload.namespace.clone(),
                    workload: workload.name.clone(),
                    outcome,
                });
            }
        }

        let report = RunReport {
            dry_run,
            started_at,
            finished_at: Utc::now(),
            summary,
            workloads,
        };

        logger.log_summary(&report.summary);
        self.observability
            .set_last_run(&report.summary, report.finished_at.timestamp());
        info!(
            updated = report.updated(),
            unchanged = report.unchanged(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Run finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        optimizer: &Optimizer<'_>,
        logger: &StructuredLogger,
        workload: &Workload,
        filter: &NameFilter,
        dry_run: bool,
        summary: &mut RunSummary,
    ) -> WorkloadOutcome {
        let skipped = |error: crate::error::OptimizerError| {
            logger.log_skip(&workload.namespace, &workload.name, &error);
            WorkloadOutcome::Skipped {
                reason: error.to_string(),
                gating: error.is_gating(),
            }
        };

        let plan = match optimizer.optimize_workload(workload, filter, Utc::now()).await {
            Ok(plan) => plan,
            Err(e) => return skipped(e),
        };

        if !plan.changed {
            info!(
                namespace = %workload.namespace,
                workload = %workload.name,
                "No container changed, leaving workload untouched"
            );
            summary.merge(&plan.summary);
            return WorkloadOutcome::Unchanged;
        }

        logger.log_update(&workload.namespace, &workload.name);
        if let Err(e) = self.store.patch_workload(&plan.workload, dry_run).await {
            return skipped(e);
        }
        summary.merge(&plan.summary);

        if self.policy.write_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.policy.write_delay_ms)).await;
        }
        WorkloadOutcome::Updated
    }
}
