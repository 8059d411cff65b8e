//! Policy loading: defaults, optional file, then `OPTIMIZER_*` environment

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use optimizer_lib::Policy;
use std::path::Path;

fn environment() -> Environment {
    Environment::with_prefix("OPTIMIZER").try_parsing(true)
}

fn build(builder: ConfigBuilder<DefaultState>) -> Result<Policy> {
    let policy: Policy = builder
        .build()
        .context("failed to read policy sources")?
        .try_deserialize()
        .context("failed to parse policy")?;
    policy.validate()?;
    Ok(policy)
}

/// Load and validate the policy
pub fn load_policy(path: Option<&Path>) -> Result<Policy> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    build(builder.add_source(environment()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(content: &str) -> Result<Policy> {
        build(config::Config::builder().add_source(File::from_str(content, FileFormat::Toml)))
    }

    #[test]
    fn test_empty_source_gives_defaults() {
        let policy = from_toml("").unwrap();
        assert_eq!(policy.change_threshold, 0.1);
        assert_eq!(policy.workload_type, "deployment");
    }

    #[test]
    fn test_file_overrides() {
        let policy = from_toml(
            r#"
            change_threshold = 0.2
            min_memory_request = "32Mi"
            max_memory_limit = 17179869184
            trend_enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(policy.change_threshold, 0.2);
        assert_eq!(policy.min_memory_request, 32 * 1024 * 1024);
        assert_eq!(policy.max_memory_limit, 16 * 1024 * 1024 * 1024);
        assert!(!policy.trend_enabled);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(from_toml("min_cpu_request = 8.0\nmax_cpu_request = 2.0").is_err());
        assert!(from_toml(r#"min_memory_request = "lots""#).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        assert!(from_toml("max_cpu_request = nan").is_err());
        assert!(from_toml("trend_min_ratio = nan").is_err());
    }
}
