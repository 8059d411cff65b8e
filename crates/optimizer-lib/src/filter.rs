//! Namespace / workload / container name filters

use crate::error::{OptimizerError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::OnceLock;

const MAX_NAME_LENGTH: usize = 253;

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Check whether `name` is a valid Kubernetes object name
pub fn is_valid_k8s_name(name: &str) -> bool {
    if name.len() > MAX_NAME_LENGTH {
        return false;
    }
    NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("name pattern is valid"))
        .is_match(name)
}

/// Compile a user supplied pattern
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| OptimizerError::InvalidPattern(format!("{}: {}", pattern, e)))
}

/// Build an anchored pattern matching exactly one object name
pub fn exact_name_pattern(name: &str) -> Result<String> {
    if !is_valid_k8s_name(name) {
        return Err(OptimizerError::InvalidPattern(format!(
            "'{}' is not a valid k8s object name",
            name
        )));
    }
    Ok(format!("^{}$", name))
}

/// Format `k=v` pairs separated by commas, for compact log fields
pub fn format_pairs<K: Display, V: Display>(values: &BTreeMap<K, V>) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Selection of namespaces, workloads and containers for a run
///
/// Patterns are unanchored searches, so `.*` selects everything.
#[derive(Debug, Clone)]
pub struct NameFilter {
    pub namespace: Regex,
    pub workload: Regex,
    pub container: Regex,
}

impl NameFilter {
    pub fn new(namespace: &str, workload: &str, container: &str) -> Result<Self> {
        Ok(Self {
            namespace: compile_pattern(namespace)?,
            workload: compile_pattern(workload)?,
            container: compile_pattern(container)?,
        })
    }

    /// Filter that accepts everything
    pub fn all() -> Self {
        Self::new(".*", ".*", ".*").expect("match-all patterns are valid")
    }

    pub fn matches_namespace(&self, name: &str) -> bool {
        self.namespace.is_match(name)
    }

    pub fn matches_workload(&self, name: &str) -> bool {
        self.workload.is_match(name)
    }

    pub fn matches_container(&self, name: &str) -> bool {
        self.container.is_match(name)
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::all()
    }
}
