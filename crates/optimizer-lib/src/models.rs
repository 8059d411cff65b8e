//! Core data models for the optimizer

use crate::error::Result;
use crate::quantity::{parse_cpu, parse_memory, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requests and limits of a container as raw quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// A container of a workload's pod template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceRequirements::default(),
        }
    }

    pub fn with_requests<K: Into<String>, V: Into<String>>(
        mut self,
        requests: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.resources.requests = requests
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_limits<K: Into<String>, V: Into<String>>(
        mut self,
        limits: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.resources.limits = limits
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }
}

/// A replicated workload (deployment-like object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub creation_timestamp: DateTime<Utc>,
    pub replicas: i32,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<Container>,
}

impl Workload {
    /// Resource map of all containers, keyed by container name
    pub fn resource_map(&self) -> BTreeMap<String, ResourceRequirements> {
        self.containers
            .iter()
            .map(|c| (c.name.clone(), c.resources.clone()))
            .collect()
    }
}

/// A resource metric tracked by an autoscaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalerMetric {
    pub resource: ResourceKind,
    /// Target average utilization in percent of the request
    pub target_utilization: Option<i32>,
}

/// Horizontal autoscaler configuration targeting a workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoscaler {
    pub name: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub metrics: Vec<AutoscalerMetric>,
}

impl Autoscaler {
    pub fn metric(&self, resource: ResourceKind) -> Option<&AutoscalerMetric> {
        self.metrics.iter().find(|m| m.resource == resource)
    }
}

/// Parsed resource values of one container; `None` means the field is not set
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContainerResourceSpec {
    /// CPU request in cores
    pub cpu_request: Option<f64>,
    /// Memory request in bytes
    pub memory_request: Option<u64>,
    /// Memory limit in bytes
    pub memory_limit: Option<u64>,
}

impl ContainerResourceSpec {
    /// Parse the fields the optimizer manages; malformed values are errors
    pub fn from_requirements(resources: &ResourceRequirements) -> Result<Self> {
        Ok(Self {
            cpu_request: resources
                .requests
                .get(ResourceKind::Cpu.key())
                .map(|v| parse_cpu(v))
                .transpose()?,
            memory_request: resources
                .requests
                .get(ResourceKind::Memory.key())
                .map(|v| parse_memory(v))
                .transpose()?,
            memory_limit: resources
                .limits
                .get(ResourceKind::Memory.key())
                .map(|v| parse_memory(v))
                .transpose()?,
        })
    }
}
