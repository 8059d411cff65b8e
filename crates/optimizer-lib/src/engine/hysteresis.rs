//! Suppression of recommendations below the change threshold

/// Stand-in for an unset CPU request (cores)
pub const CPU_SENTINEL: f64 = 0.001;
/// Stand-in for an unset memory request or limit (bytes)
pub const MEMORY_SENTINEL: u64 = 1;

/// Outcome of comparing a recommendation with the current value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision<T> {
    /// Current value, with the sentinel substituted when unset
    pub old: T,
    /// Value to apply: the recommendation, or `old` when the change is too small
    pub value: T,
    pub changed: bool,
    pub diff_pct: i64,
}

/// `round((new / old - 1) * 100)`
pub fn diff_percent(old: f64, new: f64) -> i64 {
    ((new / old - 1.0) * 100.0).round() as i64
}

fn decide<T: Copy>(old: T, new: T, old_value: f64, new_value: f64, threshold: f64) -> Decision<T> {
    let diff_pct = diff_percent(old_value, new_value);
    let changed = (diff_pct.unsigned_abs() as f64) >= threshold * 100.0;
    Decision {
        old,
        value: if changed { new } else { old },
        changed,
        diff_pct,
    }
}

pub fn filter_cpu(old: Option<f64>, new: f64, threshold: f64) -> Decision<f64> {
    let old = match old {
        Some(cores) if cores > 0.0 => cores,
        _ => CPU_SENTINEL,
    };
    decide(old, new, old, new, threshold)
}

pub fn filter_memory(old: Option<u64>, new: u64, threshold: f64) -> Decision<u64> {
    let old = match old {
        Some(bytes) if bytes > 0 => bytes,
        _ => MEMORY_SENTINEL,
    };
    decide(old, new, old as f64, new as f64, threshold)
}
