//! Command-line interface

use clap::{Parser, ValueEnum};
use optimizer_lib::filter::exact_name_pattern;
use optimizer_lib::{NameFilter, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Right-sizes CPU and memory of Kubernetes workloads from Prometheus usage history
#[derive(Debug, Parser)]
#[command(name = "k8s-optimizer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Prometheus base URL
    #[arg(long, env = "PROMETHEUS_URL", default_value = "http://localhost:9090")]
    pub prometheus_url: String,

    /// Basic auth user for Prometheus
    #[arg(long, env = "PROMETHEUS_USER")]
    pub prometheus_user: Option<String>,

    /// Basic auth password for Prometheus
    #[arg(long, env = "PROMETHEUS_PASSWORD", hide_env_values = true)]
    pub prometheus_password: Option<String>,

    /// Policy file (TOML, YAML or JSON); OPTIMIZER_* env vars override it
    #[arg(long, env = "OPTIMIZER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Send patches with dryRun=All
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Single namespace
    #[arg(short = 'n', long, conflicts_with = "namespace_pattern")]
    pub namespace: Option<String>,

    /// Namespace regex
    #[arg(long, env = "NAMESPACE_PATTERN")]
    pub namespace_pattern: Option<String>,

    /// Single deployment
    #[arg(short = 'd', long, conflicts_with = "deployment_pattern")]
    pub deployment: Option<String>,

    /// Deployment regex
    #[arg(long, env = "DEPLOYMENT_PATTERN")]
    pub deployment_pattern: Option<String>,

    /// Single container
    #[arg(short = 'c', long, conflicts_with = "container_pattern")]
    pub container: Option<String>,

    /// Container regex
    #[arg(long, env = "CONTAINER_PATTERN")]
    pub container_pattern: Option<String>,

    /// Also process deployments scaled to zero
    #[arg(long)]
    pub include_idle: bool,

    /// Repeat the run every N seconds and serve /healthz and /metrics
    #[arg(long, env = "INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// Port of the health/metrics server in periodic mode
    #[arg(long, env = "LISTEN_PORT", default_value_t = 8080)]
    pub listen_port: u16,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn pattern(name: Option<&str>, pattern: Option<&str>) -> Result<String> {
    match (name, pattern) {
        (Some(name), _) => exact_name_pattern(name),
        (None, Some(pattern)) => Ok(pattern.to_string()),
        (None, None) => Ok(".*".to_string()),
    }
}

impl Cli {
    /// Build the name filter; single names must be valid object names
    pub fn name_filter(&self) -> Result<NameFilter> {
        NameFilter::new(
            &pattern(self.namespace.as_deref(), self.namespace_pattern.as_deref())?,
            &pattern(self.deployment.as_deref(), self.deployment_pattern.as_deref())?,
            &pattern(self.container.as_deref(), self.container_pattern.as_deref())?,
        )
    }

    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
