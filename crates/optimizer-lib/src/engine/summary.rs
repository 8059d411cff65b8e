//! Replica-weighted totals of a run

use super::sizing::SizedResources;
use super::hysteresis::diff_percent;
use crate::quantity::MIB;
use serde::Serialize;

/// Old and new resource totals across all processed containers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Cores
    pub old_cpu: f64,
    pub new_cpu: f64,
    /// Bytes
    pub old_memory_request: f64,
    pub new_memory_request: f64,
    pub old_memory_limit: f64,
    pub new_memory_limit: f64,
}

/// Percent change of a total, `None` without an old total
pub fn percent_change(old: f64, new: f64) -> Option<i64> {
    (old > 0.0).then(|| diff_percent(old, new))
}

impl RunSummary {
    /// Add one container, weighted by the workload's replica count
    pub fn record(&mut self, old: &SizedResources, new: &SizedResources, replicas: i32) {
        let weight = replicas.max(0) as f64;
        self.old_cpu += old.cpu_request * weight;
        self.new_cpu += new.cpu_request * weight;
        self.old_memory_request += old.memory_request as f64 * weight;
        self.new_memory_request += new.memory_request as f64 * weight;
        self.old_memory_limit += old.memory_limit as f64 * weight;
        self.new_memory_limit += new.memory_limit as f64 * weight;
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.old_cpu += other.old_cpu;
        self.new_cpu += other.new_cpu;
        self.old_memory_request += other.old_memory_request;
        self.new_memory_request += other.new_memory_request;
        self.old_memory_limit += other.old_memory_limit;
        self.new_memory_limit += other.new_memory_limit;
    }

    pub fn is_empty(&self) -> bool {
        *self == RunSummary::default()
    }

    /// One line per resource class: `old -> new (pct%)`
    pub fn report_lines(&self) -> Vec<String> {
        let cpu = |cores: f64| format!("{}m", (cores * 1000.0).round());
        let mem = |bytes: f64| format!("{}Mi", (bytes / MIB as f64).round());
        let pct = |old: f64, new: f64| {
            percent_change(old, new)
                .map(|p| format!(" ({}%)", p))
                .unwrap_or_default()
        };

        vec![
            format!(
                "Summary cpu requests: {} -> {}{}",
                cpu(self.old_cpu),
                cpu(self.new_cpu),
                pct(self.old_cpu, self.new_cpu)
            ),
            format!(
                "Summary memory requests: {} -> {}{}",
                mem(self.old_memory_request),
                mem(self.new_memory_request),
                pct(self.old_memory_request, self.new_memory_request)
            ),
            format!(
                "Summary memory limits: {} -> {}{}",
                mem(self.old_memory_limit),
                mem(self.new_memory_limit),
                pct(self.old_memory_limit, self.new_memory_limit)
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::GIB;

    #[test]
    fn test_record_weights_by_replicas() {
        let mut summary = RunSummary::default();
        let old = SizedResources {
            cpu_request: 1.0,
            memory_request: GIB,
            memory_limit: 2 * GIB,
        };
        let new = SizedResources {
            cpu_request: 0.5,
            memory_request: GIB / 2,
            memory_limit: GIB,
        };
        summary.record(&old, &new, 3);

        assert_eq!(summary.old_cpu, 3.0);
        assert_eq!(summary.new_cpu, 1.5);
        assert_eq!(summary.new_memory_limit, 3.0 * GIB as f64);
    }

    #[test]
    fn test_merge() {
        let mut a = RunSummary {
            old_cpu: 100.0,
            new_cpu: 150.0,
            ..RunSummary::default()
        };
        let b = RunSummary {
            old_cpu: 100.0,
            new_cpu: 50.0,
            ..RunSummary::default()
        };
        a.merge(&b);
        assert_eq!(a.old_cpu, 200.0);
        assert_eq!(a.new_cpu, 200.0);
    }

    #[test]
    fn test_report_lines() {
        let summary = RunSummary {
            old_cpu: 100.0,
            new_cpu: 150.0,
            ..RunSummary::default()
        };
        let lines = summary.report_lines();
        assert_eq!(lines[0], "Summary cpu requests: 100000m -> 150000m (50%)");
        // No percentage without an old total
        assert_eq!(lines[1], "Summary memory requests: 0Mi -> 0Mi");
    }

    #[test]
    fn test_empty() {
        assert!(RunSummary::default().is_empty());
        assert_eq!(percent_change(0.0, 5.0), None);
        assert_eq!(percent_change(2.0, 1.0), Some(-50));
    }
}
