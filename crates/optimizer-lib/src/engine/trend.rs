//! Load trend: recent usage against the same window one period earlier

use crate::error::{OptimizerError, Result};
use crate::metrics::{UsageHistory, UsageSeries, Window};
use crate::policy::Policy;
use crate::quantity::ResourceKind;
use tracing::debug;

/// `current / baseline` rounded to 3 decimals and clamped to the trend bounds
pub fn bound_trend(current: f64, baseline: f64, policy: &Policy) -> Result<f64> {
    if baseline.is_nan() || baseline <= 0.0 || !current.is_finite() || !baseline.is_finite() {
        return Err(OptimizerError::InvalidTrend { current, baseline });
    }
    let ratio = (current / baseline * 1000.0).round() / 1000.0;
    Ok(ratio.clamp(policy.trend_min_ratio, policy.trend_max_ratio))
}

/// Trend multiplier for one resource class of a container; 1.0 when disabled
pub async fn estimate_trend(
    history: &UsageHistory<'_>,
    kind: ResourceKind,
    namespace: &str,
    workload: &str,
    container: &str,
    policy: &Policy,
) -> Result<f64> {
    if !policy.trend_enabled {
        return Ok(1.0);
    }

    let series = UsageSeries::for_kind(kind);
    let window = Window::new(policy.trend_lookback_minutes);
    let current = history
        .usage(series, namespace, workload, container, policy.trend_quantile, window)
        .await?;
    let baseline = history
        .usage(
            series,
            namespace,
            workload,
            container,
            policy.trend_quantile,
            window.with_offset(policy.trend_offset_minutes),
        )
        .await?;

    let trend = bound_trend(current, baseline, policy)?;
    debug!(
        namespace = %namespace,
        workload = %workload,
        container = %container,
        resource = %kind,
        current,
        baseline,
        trend,
        "Estimated usage trend"
    );
    Ok(trend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMetrics;

    #[test]
    fn test_bound_trend() {
        let policy = Policy::default();
        assert_eq!(bound_trend(1.2, 1.0, &policy).unwrap(), 1.2);
        assert_eq!(bound_trend(2.0, 3.0, &policy).unwrap(), 0.667);
        assert_eq!(bound_trend(10.0, 1.0, &policy).unwrap(), 1.5);
        assert_eq!(bound_trend(0.0, 1.0, &policy).unwrap(), 0.5);
    }

    #[test]
    fn test_trend_always_within_bounds() {
        let policy = Policy::default();
        for current in [0.0, 1e-9, 0.3, 1.0, 7.5, 1e6, 1e15] {
            for baseline in [1e-9, 0.3, 1.0, 7.5, 1e6, 1e15] {
                let trend = bound_trend(current, baseline, &policy).unwrap();
                assert!(
                    (policy.trend_min_ratio..=policy.trend_max_ratio).contains(&trend),
                    "{} / {} -> {}",
                    current,
                    baseline,
                    trend
                );
            }
        }
    }

    #[test]
    fn test_zero_baseline_is_an_error() {
        let policy = Policy::default();
        assert!(matches!(
            bound_trend(1.0, 0.0, &policy),
            Err(OptimizerError::InvalidTrend { .. })
        ));
        assert!(bound_trend(1.0, f64::NAN, &policy).is_err());
    }

    #[tokio::test]
    async fn test_estimate_trend_queries_offset_window() {
        let policy = Policy::default();
        let metrics = FakeMetrics::new()
            .respond("offset 10080m", 2.0)
            .respond("cpu_cores_avg", 3.0);
        let history = UsageHistory::new(&metrics, "deployment");

        let trend = estimate_trend(&history, ResourceKind::Cpu, "shop", "web", "nginx", &policy)
            .await
            .unwrap();

        assert_eq!(trend, 1.5);
        let queries = metrics.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains("[60m]") && !queries[0].contains("offset"));
        assert!(queries[1].ends_with("[60m] offset 10080m))"));
    }

    #[tokio::test]
    async fn test_missing_baseline_propagates() {
        let policy = Policy::default();
        let metrics = FakeMetrics::new();
        let history = UsageHistory::new(&metrics, "deployment");

        let err = estimate_trend(&history, ResourceKind::Memory, "shop", "web", "nginx", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_disabled_trend_skips_queries() {
        let policy = Policy {
            trend_enabled: false,
            ..Policy::default()
        };
        let metrics = FakeMetrics::new();
        let history = UsageHistory::new(&metrics, "deployment");

        let trend = estimate_trend(&history, ResourceKind::Cpu, "shop", "web", "nginx", &policy)
            .await
            .unwrap();
        assert_eq!(trend, 1.0);
        assert!(metrics.queries().is_empty());
    }
}
