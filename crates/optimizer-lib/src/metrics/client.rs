//! HTTP client for the Prometheus query API

use super::{MetricsSource, QueryResponse};
use crate::error::{OptimizerError, Result};
use crate::observability::OptimizerMetrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Basic auth credentials for Prometheus behind a proxy
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub user: String,
    pub password: Option<String>,
}

/// Prometheus API client
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
    basic_auth: Option<BasicAuth>,
    metrics: OptimizerMetrics,
}

#[derive(Debug, Deserialize)]
struct BuildInfoResponse {
    status: Option<String>,
}

impl PrometheusClient {
    /// Create a new client for `base_url` (e.g. `http://prometheus:9090`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let base_url = Url::parse(base_url)
            .map_err(|e| OptimizerError::InvalidResponse(format!("invalid prometheus url {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            basic_auth: None,
            metrics: OptimizerMetrics::new(),
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.into(),
            password,
        });
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        // Keep any path prefix of the base url (e.g. /prometheus/)
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(path)
            .map_err(|e| OptimizerError::InvalidResponse(format!("invalid path {}: {}", path, e)))
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.basic_auth {
            Some(auth) => request.basic_auth(&auth.user, auth.password.as_ref()),
            None => request,
        }
    }

    /// Check that the API answers with `status: success`
    pub async fn verify_connection(&self) -> Result<()> {
        let url = self.endpoint("api/v1/status/buildinfo")?;
        let body = self.get(url).send().await?.text().await?;
        debug!(body = %body, "Prometheus build info");

        let info: BuildInfoResponse = serde_json::from_str(&body)
            .map_err(|_| OptimizerError::InvalidResponse(format!("Got invalid results request: {}", body)))?;

        match info.status.as_deref() {
            Some("success") => Ok(()),
            _ => Err(OptimizerError::InvalidResponse(
                "Connection to prometheus api failed".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(&self, query: &str) -> Result<QueryResponse> {
        debug!(query = %query, "Querying prometheus");
        let url = self.endpoint("api/v1/query")?;

        let start = Instant::now();
        let body = self
            .get(url)
            .query(&[("query", query)])
            .send()
            .await?
            .text()
            .await?;
        self.metrics
            .observe_query_latency(start.elapsed().as_secs_f64());

        let response: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            OptimizerError::InvalidResponse(format!("{} (query: {})", e, query))
        })?;
        debug!(samples = response.data.result.len(), "Query answered");

        if response.status == "error" {
            return Err(OptimizerError::InvalidResponse(format!(
                "query failed: {}",
                query
            )));
        }

        Ok(response)
    }
}
