use super::MetricsSource;
use crate::error::{OptimizerError, Result};
use crate::quantity::ResourceKind;
use tracing::debug;

/// Recording-rule series aggregated per workload container
///
/// These are the only usage series the optimizer reads; the recording rules
/// producing them must exist in Prometheus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSeries {
    /// CPU cores averaged over all pods of the workload
    CpuAvg,
    /// Memory bytes of the largest pod of the workload
    MemoryMax,
    OomKilled,
}

impl UsageSeries {
    pub fn metric_name(&self) -> &'static str {
        match self {
            UsageSeries::CpuAvg => "kube_workload_container_resource_usage_cpu_cores_avg",
            UsageSeries::MemoryMax => "kube_workload_container_resource_usage_memory_bytes_max",
            UsageSeries::OomKilled => "kube_workload_container_resource_usage_memory_oom_killed",
        }
    }

    /// Series a resource class is sized and trended on
    pub fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Cpu => UsageSeries::CpuAvg,
            ResourceKind::Memory => UsageSeries::MemoryMax,
        }
    }
}

/// Range of history a query covers, ending `offset_minutes` before now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lookback_minutes: i64,
    pub offset_minutes: i64,
}

impl Window {
    pub fn new(lookback_minutes: i64) -> Self {
        Self {
            lookback_minutes,
            offset_minutes: 0,
        }
    }

    pub fn with_offset(mut self, offset_minutes: i64) -> Self {
        self.offset_minutes = offset_minutes;
        self
    }

    fn range(&self) -> String {
        if self.offset_minutes > 0 {
            format!("[{}m] offset {}m", self.lookback_minutes, self.offset_minutes)
        } else {
            format!("[{}m]", self.lookback_minutes)
        }
    }
}

/// Read-only usage queries for one workload type
pub struct UsageHistory<'a> {
    source: &'a dyn MetricsSource,
    workload_type: &'a str,
}

impl<'a> UsageHistory<'a> {
    pub fn new(source: &'a dyn MetricsSource, workload_type: &'a str) -> Self {
        Self {
            source,
            workload_type,
        }
    }

    fn workload_selector(&self, namespace: &str, workload: &str) -> String {
        format!(
            r#"namespace="{}", workload="{}", workload_type="{}""#,
            namespace, workload, self.workload_type
        )
    }

    fn container_selector(&self, namespace: &str, workload: &str, container: &str) -> String {
        format!(
            r#"{}, container="{}""#,
            self.workload_selector(namespace, workload),
            container
        )
    }

    /// First scalar of the query result, `NoData` when empty
    async fn required(&self, query: String) -> Result<f64> {
        debug!(query = %query, "Fetching usage history");
        self.source
            .query(&query)
            .await?
            .first_value()?
            .ok_or(OptimizerError::NoData { query })
    }

    async fn optional(&self, query: String) -> Result<Option<f64>> {
        debug!(query = %query, "Fetching usage history");
        self.source.query(&query).await?.first_value()
    }

    /// Number of samples of the workload's CPU series within the window
    pub async fn number_of_samples(
        &self,
        namespace: &str,
        workload: &str,
        lookback_minutes: i64,
    ) -> Result<f64> {
        let query = format!(
            "max by (namespace,workload,workload_type) (count_over_time({}{{{}}}{}))",
            UsageSeries::CpuAvg.metric_name(),
            self.workload_selector(namespace, workload),
            Window::new(lookback_minutes).range()
        );
        self.required(query).await
    }

    /// Replica count of the workload at `quantile` over the window
    pub async fn replica_history(
        &self,
        namespace: &str,
        workload: &str,
        lookback_minutes: i64,
        quantile: f64,
    ) -> Result<f64> {
        let query = format!(
            r#"max(quantile_over_time({}, kube_{}_spec_replicas{{job="kube-state-metrics", namespace="{}", {}="{}"}}{}))"#,
            quantile,
            self.workload_type,
            namespace,
            self.workload_type,
            workload,
            Window::new(lookback_minutes).range()
        );
        self.required(query).await
    }

    /// Usage of a container at `quantile` over `window`
    pub async fn usage(
        &self,
        series: UsageSeries,
        namespace: &str,
        workload: &str,
        container: &str,
        quantile: f64,
        window: Window,
    ) -> Result<f64> {
        let query = format!(
            "sum(quantile_over_time({}, {}{{{}}}{}))",
            quantile,
            series.metric_name(),
            self.container_selector(namespace, workload, container),
            window.range()
        );
        self.required(query).await
    }

    pub async fn cpu_usage(
        &self,
        namespace: &str,
        workload: &str,
        container: &str,
        quantile: f64,
        window: Window,
    ) -> Result<f64> {
        self.usage(UsageSeries::CpuAvg, namespace, workload, container, quantile, window)
            .await
    }

    pub async fn memory_usage(
        &self,
        namespace: &str,
        workload: &str,
        container: &str,
        quantile: f64,
        window: Window,
    ) -> Result<f64> {
        self.usage(UsageSeries::MemoryMax, namespace, workload, container, quantile, window)
            .await
    }

    /// OOM kills of a container within the window; no data means none
    pub async fn oom_kills(
        &self,
        namespace: &str,
        workload: &str,
        container: &str,
        lookback_minutes: i64,
    ) -> Result<u64> {
        let query = format!(
            "sum_over_time({}{{{}}}{})",
            UsageSeries::OomKilled.metric_name(),
            self.container_selector(namespace, workload, container),
            Window::new(lookback_minutes).range()
        );
        Ok(match self.optional(query).await? {
            Some(count) if count > 0.0 => count.round() as u64,
            _ => 0,
        })
    }

    /// Whether the container runs a single-threaded runtime (Node.js)
    pub async fn is_constrained_runtime(
        &self,
        namespace: &str,
        workload: &str,
        container: &str,
    ) -> Result<bool> {
        let query = format!(
            r#"count(nodejs_version_info{{container="{}"}} * on(namespace,pod) group_left(workload, workload_type) namespace_workload_pod:kube_pod_owner:relabel{{workload="{}", workload_type="{}", namespace="{}"}}) by (namespace, workload, workload_type, container)"#,
            container, workload, self.workload_type, namespace
        );
        Ok(matches!(self.optional(query).await?, Some(count) if count > 0.0))
    }
}
