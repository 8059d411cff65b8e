//! Resource recommendation library for Kubernetes workloads
//!
//! This crate provides the core functionality for:
//! - Parsing and formatting resource quantities
//! - Querying historical usage from Prometheus
//! - Reading and patching workloads through the Kubernetes API
//! - Sizing CPU/memory requests and limits from usage history
//! - Batch runs with aggregated reporting and observability

pub mod engine;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod policy;
pub mod quantity;
pub mod runner;
pub mod store;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Optimizer, RunSummary};
pub use error::{OptimizerError, Result};
pub use filter::NameFilter;
pub use metrics::{MetricsSource, PrometheusClient};
pub use models::*;
pub use observability::{OptimizerMetrics, StructuredLogger};
pub use policy::Policy;
pub use runner::{RunReport, Runner, WorkloadOutcome, WorkloadReport};
pub use store::{KubeWorkloadStore, WorkloadStore};
