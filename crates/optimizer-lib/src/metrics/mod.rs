//! Historical usage from a Prometheus-compatible metrics source
//!
//! The engine only issues instant queries and expects either a single scalar
//! sample or an empty result ("no data").

mod client;
mod queries;

pub use client::PrometheusClient;
pub use queries::{UsageHistory, UsageSeries, Window};

use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Anything that can evaluate an instant query
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn query(&self, query: &str) -> Result<QueryResponse>;
}

/// `/api/v1/query` response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub status: String,
    pub data: QueryData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType", default)]
    pub result_type: String,
    pub result: Vec<Sample>,
}

/// One vector element: labels plus `[timestamp, "value"]`
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: (f64, serde_json::Value),
}

impl Sample {
    pub fn scalar(&self) -> Result<f64> {
        match &self.value.1 {
            serde_json::Value::String(text) => text
                .parse()
                .map_err(|_| OptimizerError::InvalidResponse(format!("non-numeric sample '{}'", text))),
            serde_json::Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| OptimizerError::InvalidResponse(format!("non-numeric sample {}", number))),
            other => Err(OptimizerError::InvalidResponse(format!(
                "unexpected sample value {}",
                other
            ))),
        }
    }
}

impl QueryResponse {
    /// Value of the first sample, `None` when the result is empty
    pub fn first_value(&self) -> Result<Option<f64>> {
        self.data.result.first().map(Sample::scalar).transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.data.result.is_empty()
    }
}
