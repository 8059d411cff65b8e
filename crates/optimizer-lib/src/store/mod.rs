//! Access to the workloads being optimized

mod kubernetes;

pub use kubernetes::KubeWorkloadStore;

use crate::error::Result;
use crate::filter::NameFilter;
use crate::models::{Autoscaler, Workload};
use async_trait::async_trait;

/// Reads and persists workloads and their autoscalers
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Namespaces whose name matches the filter
    async fn list_namespaces(&self, filter: &NameFilter) -> Result<Vec<String>>;

    /// Workloads of a namespace matching the filter; zero-replica workloads
    /// are left out when `only_running` is set
    async fn list_workloads(
        &self,
        namespace: &str,
        filter: &NameFilter,
        only_running: bool,
    ) -> Result<Vec<Workload>>;

    /// Autoscaler whose scale target is the workload, if any
    async fn get_autoscaler_for(&self, namespace: &str, workload: &str) -> Result<Option<Autoscaler>>;

    /// Write container resources and annotations back
    async fn patch_workload(&self, workload: &Workload, dry_run: bool) -> Result<Workload>;
}
