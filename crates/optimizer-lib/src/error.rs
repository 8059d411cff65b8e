//! Error taxonomy for the optimizer
//!
//! Gating errors are routine outcomes that cause a workload to be skipped;
//! everything else is a failure of the current unit of work.

use thiserror::Error;

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Quantity text does not look like `<number><unit>`
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Quantity suffix is not a known unit
    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    /// A required history query returned an empty result
    #[error("No data found for prometheus query: {query}")]
    NoData { query: String },

    #[error("Got invalid results from metrics source: {0}")]
    InvalidResponse(String),

    #[error(
        "The workload is too young. It was created {age_minutes} minutes ago, \
         which is below the minimum threshold of {threshold} minutes"
    )]
    TooYoung { age_minutes: i64, threshold: i64 },

    #[error(
        "The workload was modified too recently. It was updated {age_minutes} minutes ago, \
         which is below the minimum threshold of {threshold} minutes"
    )]
    UpdatedTooRecently { age_minutes: i64, threshold: i64 },

    #[error(
        "The lookback period ({lookback_minutes} minutes) is below the minimum \
         required ({minimum} minutes)"
    )]
    LookbackTooShort { lookback_minutes: i64, minimum: i64 },

    #[error("The history samples ({samples}) are below the minimum required ({minimum})")]
    InsufficientSamples { samples: f64, minimum: i64 },

    /// Trend baseline is zero or missing
    #[error("Cannot compute trend: current usage {current}, baseline usage {baseline}")]
    InvalidTrend { current: f64, baseline: f64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid name filter: {0}")]
    InvalidPattern(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OptimizerError {
    /// True for expected outcomes that only mean "not eligible right now"
    pub fn is_gating(&self) -> bool {
        matches!(
            self,
            OptimizerError::TooYoung { .. }
                | OptimizerError::UpdatedTooRecently { .. }
                | OptimizerError::LookbackTooShort { .. }
                | OptimizerError::InsufficientSamples { .. }
        )
    }
}
