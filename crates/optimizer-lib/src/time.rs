//! Timestamp helpers for workload age and the last-update annotation

use crate::error::{OptimizerError, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Whole minutes elapsed between `timestamp` and `now` (truncated)
pub fn minutes_since(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> i64 {
    (now - timestamp).num_seconds() / 60
}

/// Parse an RFC 3339 timestamp as written into the last-update annotation
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OptimizerError::InvalidTimestamp(format!("{}: {}", text, e)))
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}
