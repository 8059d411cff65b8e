//! In-memory fakes for the metrics source and the workload store

use crate::error::{OptimizerError, Result};
use crate::filter::NameFilter;
use crate::metrics::{MetricsSource, QueryData, QueryResponse, Sample};
use crate::models::{Autoscaler, Container, Workload};
use crate::store::WorkloadStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Answers queries by the first registered fragment they contain
#[derive(Default)]
pub struct FakeMetrics {
    responses: Vec<(String, f64)>,
    queries: Mutex<Vec<String>>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, fragment: &str, value: f64) -> Self {
        self.responses.push((fragment.to_string(), value));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn query(&self, query: &str) -> Result<QueryResponse> {
        self.queries.lock().unwrap().push(query.to_string());

        let result = self
            .responses
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, value)| Sample {
                metric: BTreeMap::new(),
                value: (0.0, serde_json::Value::String(value.to_string())),
            })
            .into_iter()
            .collect();

        Ok(QueryResponse {
            status: "success".to_string(),
            data: QueryData {
                result_type: "vector".to_string(),
                result,
            },
        })
    }
}

/// Workloads grouped by namespace, recording every patch
#[derive(Default)]
pub struct FakeStore {
    pub namespaces: BTreeMap<String, Vec<Workload>>,
    pub autoscalers: BTreeMap<(String, String), Autoscaler>,
    pub fail_patch: bool,
    patched: Mutex<Vec<(Workload, bool)>>,
}

impl FakeStore {
    pub fn with_workloads(workloads: Vec<Workload>) -> Self {
        let mut store = Self::default();
        for workload in workloads {
            store
                .namespaces
                .entry(workload.namespace.clone())
                .or_default()
                .push(workload);
        }
        store
    }

    pub fn patched(&self) -> Vec<(Workload, bool)> {
        self.patched.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkloadStore for FakeStore {
    async fn list_namespaces(&self, filter: &NameFilter) -> Result<Vec<String>> {
        Ok(self
            .namespaces
            .keys()
            .filter(|ns| filter.matches_namespace(ns))
            .cloned()
            .collect())
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        filter: &NameFilter,
        only_running: bool,
    ) -> Result<Vec<Workload>> {
        Ok(self
            .namespaces
            .get(namespace)
            .map(|workloads| {
                workloads
                    .iter()
                    .filter(|w| filter.matches_workload(&w.name))
                    .filter(|w| !only_running || w.replicas > 0)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_autoscaler_for(&self, namespace: &str, workload: &str) -> Result<Option<Autoscaler>> {
        Ok(self
            .autoscalers
            .get(&(namespace.to_string(), workload.to_string()))
            .cloned())
    }

    async fn patch_workload(&self, workload: &Workload, dry_run: bool) -> Result<Workload> {
        if self.fail_patch {
            return Err(OptimizerError::InvalidResponse("patch rejected".to_string()));
        }
        self.patched
            .lock()
            .unwrap()
            .push((workload.clone(), dry_run));
        Ok(workload.clone())
    }
}

/// Workload created `age_minutes` ago with the given containers
pub fn workload(namespace: &str, name: &str, age_minutes: i64, containers: Vec<Container>) -> Workload {
    Workload {
        name: name.to_string(),
        namespace: namespace.to_string(),
        creation_timestamp: Utc::now() - Duration::minutes(age_minutes),
        replicas: 1,
        annotations: BTreeMap::new(),
        containers,
    }
}

/// Metrics for a container that used `cpu` cores and `memory` bytes throughout
pub fn steady_metrics(samples: f64, cpu: f64, memory: f64) -> FakeMetrics {
    FakeMetrics::new()
        .respond("count_over_time", samples)
        .respond("cpu_cores_avg", cpu)
        .respond("memory_bytes_max", memory)
}
