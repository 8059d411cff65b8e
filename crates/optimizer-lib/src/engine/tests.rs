//! End-to-end scenarios for the recommendation engine
//!
//! These run the full pipeline against in-memory metrics and store fakes.

use super::*;
use crate::error::OptimizerError;
use crate::filter::NameFilter;
use crate::models::{Autoscaler, AutoscalerMetric, Container};
use crate::policy::Policy;
use crate::quantity::{ResourceKind, GIB};
use crate::testing::{steady_metrics, workload, FakeMetrics, FakeStore};
use crate::time::{format_timestamp, parse_timestamp};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

fn policy() -> Policy {
    Policy {
        memory_limit_ratio: 2.0,
        ..Policy::default()
    }
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_right_sizes_container() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, (2 * GIB) as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload(
        "shop",
        "web",
        6000,
        vec![Container::new("nginx").with_requests([("cpu", "6"), ("memory", "1Gi")])],
    );
    let now = Utc::now();
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), now).await.unwrap();

    assert!(plan.changed);
    assert_eq!(plan.lookback_minutes, 5000);
    let resources = &plan.workload.containers[0].resources;
    assert_eq!(resources.requests, map(&[("cpu", "3000m"), ("memory", "2048Mi")]));
    assert_eq!(resources.limits, map(&[("memory", "4096Mi")]));

    let annotations = &plan.workload.annotations;
    assert_eq!(
        annotations[&policy.old_resources_annotation()],
        r#"{"nginx":{"requests":{"cpu":"6","memory":"1Gi"},"limits":{}}}"#
    );
    let stamped = parse_timestamp(&annotations[&policy.last_update_annotation()]).unwrap();
    assert_eq!(stamped.timestamp_micros(), now.timestamp_micros());

    // Input workload is left as it was
    assert!(w.annotations.is_empty());
    assert_eq!(w.containers[0].resources.requests["cpu"], "6");
}

#[tokio::test]
async fn test_too_young_workload_is_gated() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, GIB as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload("shop", "web", 10, vec![Container::new("nginx")]);
    let err = optimizer
        .optimize_workload(&w, &NameFilter::all(), Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, OptimizerError::TooYoung { age_minutes: 10, threshold: 60 }));
    assert!(err.is_gating());
    assert!(metrics.queries().is_empty());
}

#[tokio::test]
async fn test_recently_updated_workload_is_gated() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, GIB as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let now = Utc::now();
    let mut w = workload("shop", "web", 6000, vec![Container::new("nginx")]);
    w.annotations.insert(
        policy.last_update_annotation(),
        format_timestamp(now - Duration::minutes(20)),
    );

    let err = optimizer
        .optimize_workload(&w, &NameFilter::all(), now)
        .await
        .unwrap_err();
    assert!(matches!(err, OptimizerError::UpdatedTooRecently { age_minutes: 20, .. }));
}

#[tokio::test]
async fn test_insufficient_samples_is_gated() {
    let policy = policy();
    let metrics = steady_metrics(3.0, 3.0, GIB as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload("shop", "web", 6000, vec![Container::new("nginx")]);
    let err = optimizer
        .optimize_workload(&w, &NameFilter::all(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, OptimizerError::InsufficientSamples { .. }));
}

#[tokio::test]
async fn test_autoscaler_pressure_scales_cpu() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 10.0, GIB as f64).respond("kube_deployment_spec_replicas", 9.0);
    let mut store = FakeStore::default();
    store.autoscalers.insert(
        ("shop".into(), "web".into()),
        Autoscaler {
            name: "web".into(),
            min_replicas: 1,
            max_replicas: 10,
            metrics: vec![AutoscalerMetric {
                resource: ResourceKind::Cpu,
                target_utilization: Some(80),
            }],
        },
    );
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let mut w = workload("shop", "web", 6000, vec![Container::new("php")]);
    w.replicas = 9;
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    assert!((plan.target.cpu - 1.89).abs() < 1e-9);
    assert_eq!(plan.target.target_replicas, 5);
    // 10 cores over 5 replicas, times 1.89
    assert_eq!(plan.containers[0].decision.cpu_request.value, 3.78);
    assert!(metrics
        .queries()
        .iter()
        .any(|q| q.starts_with("sum(quantile_over_time(0.8, kube_workload_container_resource_usage_cpu_cores_avg")));
}

#[tokio::test]
async fn test_small_change_leaves_workload_untouched() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.1, (2 * GIB) as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload(
        "shop",
        "web",
        6000,
        vec![Container::new("nginx")
            .with_requests([("cpu", "3"), ("memory", "2Gi")])
            .with_limits([("memory", "4Gi")])],
    );
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    assert!(!plan.changed);
    assert_eq!(plan.workload, w);
    assert_eq!(plan.summary.old_cpu, 3.0);
    assert_eq!(plan.summary.new_cpu, 3.0);
}

#[tokio::test]
async fn test_dropped_cpu_limit_counts_as_change() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, (2 * GIB) as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload(
        "shop",
        "web",
        6000,
        vec![Container::new("nginx")
            .with_requests([("cpu", "3"), ("memory", "2Gi"), ("ephemeral-storage", "1Gi")])
            .with_limits([("cpu", "4"), ("memory", "4Gi")])],
    );
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    assert!(plan.changed);
    let resources = &plan.workload.containers[0].resources;
    assert_eq!(
        resources.requests,
        map(&[("cpu", "3"), ("ephemeral-storage", "1Gi"), ("memory", "2Gi")])
    );
    assert_eq!(resources.limits, map(&[("memory", "4Gi")]));
}

#[tokio::test]
async fn test_container_filter() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, (2 * GIB) as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload(
        "shop",
        "web",
        6000,
        vec![
            Container::new("app").with_requests([("cpu", "6")]),
            Container::new("istio-proxy").with_limits([("cpu", "2")]),
        ],
    );
    let filter = NameFilter::new(".*", ".*", "^app$").unwrap();
    let plan = optimizer.optimize_workload(&w, &filter, Utc::now()).await.unwrap();

    assert_eq!(plan.containers.len(), 1);
    assert_eq!(plan.workload.containers[0].resources.requests["cpu"], "3000m");
    assert_eq!(plan.workload.containers[1], w.containers[1]);
    assert!(metrics.queries().iter().all(|q| !q.contains("istio-proxy")));
}

#[tokio::test]
async fn test_sizes_from_recording_rule_series_only() {
    let policy = policy();
    let metrics = FakeMetrics::new()
        .respond("count_over_time", 5000.0)
        .respond("kube_workload_container_resource_usage_cpu_cores_avg", 3.0)
        .respond("kube_workload_container_resource_usage_memory_bytes_max", (2 * GIB) as f64);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload(
        "shop",
        "web",
        6000,
        vec![Container::new("nginx").with_requests([("cpu", "6"), ("memory", "1Gi")])],
    );
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    let resources = &plan.workload.containers[0].resources;
    assert_eq!(resources.requests, map(&[("cpu", "3000m"), ("memory", "2048Mi")]));
    assert_eq!(resources.limits, map(&[("memory", "4096Mi")]));
}

#[tokio::test]
async fn test_missing_history_fails_whole_workload() {
    let policy = policy();
    let metrics = FakeMetrics::new()
        .respond("count_over_time", 5000.0)
        .respond("cpu_cores_avg", 1.0);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload("shop", "web", 6000, vec![Container::new("nginx")]);
    let err = optimizer
        .optimize_workload(&w, &NameFilter::all(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, OptimizerError::NoData { .. }));
    assert!(!err.is_gating());
}

#[tokio::test]
async fn test_oom_kills_widen_memory_quantile() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 1.0, GIB as f64).respond("memory_oom_killed", 2.0);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload("shop", "web", 6000, vec![Container::new("nginx")]);
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    let container = &plan.containers[0];
    assert_eq!(container.recommendation.oom_kills, 2);
    assert_eq!(container.decision.memory_request.value, GIB + GIB / 2);
    assert_eq!(container.decision.memory_limit.value, 4 * GIB);
    assert!(metrics
        .queries()
        .iter()
        .any(|q| q.contains("quantile_over_time(0.99, kube_workload_container_resource_usage_memory_bytes_max")));
}

#[tokio::test]
async fn test_constrained_runtime_caps_cpu() {
    let policy = policy();
    let metrics = steady_metrics(5000.0, 3.0, GIB as f64).respond("nodejs_version_info", 1.0);
    let store = FakeStore::default();
    let optimizer = Optimizer::new(&policy, &metrics, &store);

    let w = workload("shop", "web", 6000, vec![Container::new("node")]);
    let plan = optimizer.optimize_workload(&w, &NameFilter::all(), Utc::now()).await.unwrap();

    assert_eq!(plan.containers[0].recommendation.runtime, RuntimeHint::Constrained);
    assert_eq!(plan.workload.containers[0].resources.requests["cpu"], "1000m");
}

#[test]
fn test_optimize_container_scenario() {
    let container = Container::new("nginx").with_requests([("cpu", "6"), ("memory", "1Gi")]);
    let current = crate::models::ContainerResourceSpec::from_requirements(&container.resources).unwrap();
    let recommended = SizedResources {
        cpu_request: 3.0,
        memory_request: 2 * GIB,
        memory_limit: 4 * GIB,
    };
    let decision = ContainerDecision::new(&current, &recommended, 0.1);

    let (updated, changed) = optimize_container(&container, &decision);
    assert!(changed);
    assert_eq!(updated.resources.requests, map(&[("cpu", "3000m"), ("memory", "2048Mi")]));
    assert_eq!(updated.resources.limits, map(&[("memory", "4096Mi")]));
    // Memory limit was unset: compared against the 1 byte sentinel
    assert_eq!(decision.old().memory_limit, MEMORY_SENTINEL);
}
