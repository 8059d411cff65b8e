//! Kubernetes-backed workload store (apps/v1 Deployments)

use super::WorkloadStore;
use crate::error::{OptimizerError, Result};
use crate::filter::NameFilter;
use crate::models::{Autoscaler, AutoscalerMetric, Container, ResourceRequirements, Workload};
use crate::quantity::ResourceKind;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Container as PodContainer, Namespace};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

const SCALE_TARGET_KIND: &str = "Deployment";

pub struct KubeWorkloadStore {
    client: Client,
}

impl KubeWorkloadStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Read the API server version; fails when the cluster is unreachable
    pub async fn verify_connection(&self) -> Result<String> {
        let version = self.client.apiserver_version().await?;
        info!(version = %version.git_version, "Connected to Kubernetes API");
        Ok(version.git_version)
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn list_namespaces(&self, filter: &NameFilter) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let mut names = Vec::new();
        for namespace in api.list(&ListParams::default()).await?.items {
            let name = namespace.name_any();
            if !filter.matches_namespace(&name) {
                debug!(namespace = %name, "Skipping namespace not matching pattern");
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        filter: &NameFilter,
        only_running: bool,
    ) -> Result<Vec<Workload>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let mut workloads = Vec::new();
        for deployment in api.list(&ListParams::default()).await?.items {
            let workload = workload_from_deployment(&deployment)?;
            if !filter.matches_workload(&workload.name) {
                debug!(workload = %workload.name, "Skipping workload not matching pattern");
                continue;
            }
            if only_running && workload.replicas == 0 {
                debug!(workload = %workload.name, "Skipping workload with zero replicas");
                continue;
            }
            workloads.push(workload);
        }
        Ok(workloads)
    }

    async fn get_autoscaler_for(&self, namespace: &str, workload: &str) -> Result<Option<Autoscaler>> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        let found = api
            .list(&ListParams::default())
            .await?
            .items
            .iter()
            .find(|hpa| targets(hpa, workload))
            .and_then(autoscaler_from_hpa);
        Ok(found)
    }

    async fn patch_workload(&self, workload: &Workload, dry_run: bool) -> Result<Workload> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
        let params = PatchParams {
            dry_run,
            ..PatchParams::default()
        };
        let patch = resource_patch(workload);
        debug!(workload = %workload.name, dry_run, patch = %patch, "Patching workload");

        let patched = api
            .patch(&workload.name, &params, &Patch::Strategic(&patch))
            .await?;
        workload_from_deployment(&patched)
    }
}

fn targets(hpa: &HorizontalPodAutoscaler, workload: &str) -> bool {
    hpa.spec.as_ref().map_or(false, |spec| {
        spec.scale_target_ref.kind == SCALE_TARGET_KIND && spec.scale_target_ref.name == workload
    })
}

fn quantity_map(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default()
}

fn container_from_pod_spec(container: &PodContainer) -> Container {
    let resources = container.resources.as_ref();
    Container {
        name: container.name.clone(),
        resources: ResourceRequirements {
            requests: quantity_map(resources.and_then(|r| r.requests.as_ref())),
            limits: quantity_map(resources.and_then(|r| r.limits.as_ref())),
        },
    }
}

/// Convert a Deployment into the optimizer's workload view
pub fn workload_from_deployment(deployment: &Deployment) -> Result<Workload> {
    let metadata = &deployment.metadata;
    let name = metadata
        .name
        .clone()
        .ok_or_else(|| OptimizerError::InvalidResponse("deployment without name".to_string()))?;
    let creation_timestamp = metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .ok_or_else(|| {
            OptimizerError::InvalidResponse(format!("deployment {} has no creation timestamp", name))
        })?;

    let spec = deployment.spec.as_ref();
    let containers = spec
        .and_then(|s| s.template.spec.as_ref())
        .map(|pod| pod.containers.iter().map(container_from_pod_spec).collect())
        .unwrap_or_default();

    Ok(Workload {
        namespace: metadata.namespace.clone().unwrap_or_default(),
        creation_timestamp,
        replicas: spec.and_then(|s| s.replicas).unwrap_or(1),
        annotations: metadata.annotations.clone().unwrap_or_default(),
        containers,
        name,
    })
}

/// Resource-type metrics of an HPA; other metric types are ignored
pub fn autoscaler_from_hpa(hpa: &HorizontalPodAutoscaler) -> Option<Autoscaler> {
    let spec = hpa.spec.as_ref()?;
    let metrics = spec
        .metrics
        .iter()
        .flatten()
        .filter(|metric| metric.type_ == "Resource")
        .filter_map(|metric| metric.resource.as_ref())
        .filter_map(|resource| {
            let kind = match resource.name.as_str() {
                "cpu" => ResourceKind::Cpu,
                "memory" => ResourceKind::Memory,
                _ => return None,
            };
            Some(AutoscalerMetric {
                resource: kind,
                target_utilization: resource.target.average_utilization,
            })
        })
        .collect();

    Some(Autoscaler {
        name: hpa.name_any(),
        min_replicas: spec.min_replicas.unwrap_or(1),
        max_replicas: spec.max_replicas,
        metrics,
    })
}

/// Strategic-merge patch with container resources and annotations.
/// A missing CPU limit is sent as `null` so the server drops it.
pub fn resource_patch(workload: &Workload) -> Value {
    let containers: Vec<Value> = workload
        .containers
        .iter()
        .map(|container| {
            let mut limits: Map<String, Value> = container
                .resources
                .limits
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            limits
                .entry(ResourceKind::Cpu.key())
                .or_insert(Value::Null);

            json!({
                "name": container.name,
                "resources": {
                    "requests": container.resources.requests,
                    "limits": limits,
                }
            })
        })
        .collect();

    json!({
        "metadata": {
            "annotations": workload.annotations,
        },
        "spec": {
            "template": {
                "spec": {
                    "containers": containers,
                }
            }
        }
    })
}
