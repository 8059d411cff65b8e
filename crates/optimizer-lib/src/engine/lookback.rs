//! Lookback window selection and eligibility gates

use crate::error::{OptimizerError, Result};
use crate::metrics::UsageHistory;
use crate::models::Workload;
use crate::policy::Policy;
use crate::time::{minutes_since, parse_timestamp};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Lookback derived from the workload's age and last update.
///
/// Fails when the workload is too young, was updated too recently or the
/// resulting window is shorter than the minimum lookback.
pub fn candidate_lookback(workload: &Workload, policy: &Policy, now: DateTime<Utc>) -> Result<i64> {
    let creation_age = minutes_since(now, workload.creation_timestamp);
    if creation_age < policy.create_age_threshold_minutes {
        return Err(OptimizerError::TooYoung {
            age_minutes: creation_age,
            threshold: policy.create_age_threshold_minutes,
        });
    }

    let mut lookback = creation_age;

    if let Some(last_update) = workload.annotations.get(&policy.last_update_annotation()) {
        let update_age = minutes_since(now, parse_timestamp(last_update)?);
        if update_age < policy.update_age_threshold_minutes {
            return Err(OptimizerError::UpdatedTooRecently {
                age_minutes: update_age,
                threshold: policy.update_age_threshold_minutes,
            });
        }
        // Only look at usage observed after the previous rollout settled
        lookback = lookback.min(update_age - policy.offset_lookback_minutes);
    }

    if lookback < policy.min_lookback_minutes {
        return Err(OptimizerError::LookbackTooShort {
            lookback_minutes: lookback,
            minimum: policy.min_lookback_minutes,
        });
    }

    Ok(lookback)
}

/// Clamp a candidate window to the samples actually available
pub fn bound_lookback(candidate: i64, samples: f64, policy: &Policy) -> Result<i64> {
    if !samples.is_finite() || samples < policy.min_lookback_minutes as f64 {
        return Err(OptimizerError::InsufficientSamples {
            samples,
            minimum: policy.min_lookback_minutes,
        });
    }
    Ok(policy
        .max_lookback_minutes
        .min(candidate)
        .min(samples.floor() as i64))
}

/// Run all gates for a workload and return the lookback to query with
pub async fn select_lookback(
    workload: &Workload,
    policy: &Policy,
    history: &UsageHistory<'_>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let candidate = candidate_lookback(workload, policy, now)?;
    let samples = history
        .number_of_samples(&workload.namespace, &workload.name, candidate)
        .await?;
    let lookback = bound_lookback(candidate, samples, policy)?;
    debug!(
        namespace = %workload.namespace,
        workload = %workload.name,
        candidate,
        samples,
        lookback,
        "Selected lookback window"
    );
    Ok(lookback)
}
