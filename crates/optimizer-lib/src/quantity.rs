//! Resource quantity parsing and formatting
//!
//! Memory is handled as an integer byte count, CPU as floating-point cores.
//! All memory suffixes are binary multiples (`K` and `Ki` both mean 1024),
//! matching how container resources are conventionally written.

use crate::error::{OptimizerError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

static MEMORY_PATTERN: OnceLock<Regex> = OnceLock::new();
static CPU_PATTERN: OnceLock<Regex> = OnceLock::new();

fn memory_pattern() -> &'static Regex {
    MEMORY_PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)\s*([a-zA-Z]*)$").expect("memory pattern is valid")
    })
}

fn cpu_pattern() -> &'static Regex {
    CPU_PATTERN.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)?)(.*)$").expect("cpu pattern is valid"))
}

fn memory_multiplier(unit: &str) -> Option<u64> {
    match unit {
        // A bare number is a plain byte count
        "" | "B" => Some(1),
        "K" | "Ki" => Some(KIB),
        "M" | "Mi" => Some(MIB),
        "G" | "Gi" => Some(GIB),
        "T" | "Ti" => Some(TIB),
        _ => None,
    }
}

fn cpu_scale(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "" => Some(value),
        "m" => Some(value / 1000.0),
        "k" => Some(value * 1000.0),
        _ => None,
    }
}

/// Parse a memory quantity such as `512Mi` or `2G` into bytes
pub fn parse_memory(text: &str) -> Result<u64> {
    let caps = memory_pattern()
        .captures(text)
        .ok_or_else(|| OptimizerError::InvalidFormat(text.to_string()))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| OptimizerError::InvalidFormat(text.to_string()))?;
    let unit = &caps[2];
    let multiplier =
        memory_multiplier(unit).ok_or_else(|| OptimizerError::InvalidUnit(unit.to_string()))?;

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(OptimizerError::InvalidFormat(text.to_string()));
    }
    Ok(bytes as u64)
}

/// Parse a CPU quantity such as `250m`, `1.5` or `2k` into cores
pub fn parse_cpu(text: &str) -> Result<f64> {
    let caps = cpu_pattern()
        .captures(text)
        .ok_or_else(|| OptimizerError::InvalidFormat(text.to_string()))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| OptimizerError::InvalidFormat(text.to_string()))?;
    let unit = &caps[2];
    cpu_scale(value, unit).ok_or_else(|| OptimizerError::InvalidUnit(unit.to_string()))
}

/// Format bytes as whole mebibytes, e.g. `2048Mi`
pub fn format_memory(bytes: u64) -> String {
    format!("{}Mi", (bytes as f64 / MIB as f64).round() as u64)
}

/// Format cores as whole millicores, e.g. `1500m`
pub fn format_cpu(cores: f64) -> String {
    format!("{}m", (cores * 1000.0).round() as u64)
}

/// The two resource classes the optimizer sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    /// Key used in container resource maps
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A parsed resource value in its canonical unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceQuantity {
    /// CPU cores
    Cpu(f64),
    /// Memory bytes
    Memory(u64),
}

impl ResourceQuantity {
    pub fn parse(kind: ResourceKind, text: &str) -> Result<Self> {
        match kind {
            ResourceKind::Cpu => parse_cpu(text).map(ResourceQuantity::Cpu),
            ResourceKind::Memory => parse_memory(text).map(ResourceQuantity::Memory),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceQuantity::Cpu(_) => ResourceKind::Cpu,
            ResourceQuantity::Memory(_) => ResourceKind::Memory,
        }
    }

    /// Numeric value in cores or bytes
    pub fn value(&self) -> f64 {
        match self {
            ResourceQuantity::Cpu(cores) => *cores,
            ResourceQuantity::Memory(bytes) => *bytes as f64,
        }
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceQuantity::Cpu(cores) => f.write_str(&format_cpu(*cores)),
            ResourceQuantity::Memory(bytes) => f.write_str(&format_memory(*bytes)),
        }
    }
}
