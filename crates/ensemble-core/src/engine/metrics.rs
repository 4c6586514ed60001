//! Per-engine pattern metrics.
//!
//! Each engine owns one [`PatternMetricsTable`]. Executions are recorded
//! silently; call [`PatternMetricsTable::flush`] to emit the table as a single
//! `tracing::info!` event.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::PatternKind;

/// Running totals for one pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub success_rate: f64,
    pub average_execution_time: Duration,
    pub total_execution_time: Duration,
    /// Sum of per-execution efficiency gains.
    pub total_efficiency_gain: f64,
    /// Agent time saved, in seconds: `Σ gain × sequential baseline`.
    pub accrued_value_secs: f64,
    /// Coordination cost, in agent-seconds: `Σ agents used × execution time`.
    pub coordination_cost_secs: f64,
}

impl PatternMetrics {
    pub fn average_efficiency_gain(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_efficiency_gain / self.total_executions as f64
        }
    }

    /// Accrued value over coordination cost; `0.0` when nothing was spent.
    pub fn roi(&self) -> f64 {
        ratio(self.accrued_value_secs, self.coordination_cost_secs)
    }

    fn record(&mut self, sample: &ExecutionSample) {
        self.total_executions += 1;
        if sample.success {
            self.successful_executions += 1;
        }
        self.success_rate = self.successful_executions as f64 / self.total_executions as f64;
        self.total_execution_time += sample.elapsed;
        // total_executions >= 1 here; u32 division saturates for absurd counts
        let divisor = u32::try_from(self.total_executions).unwrap_or(u32::MAX);
        self.average_execution_time = self.total_execution_time / divisor;
        self.total_efficiency_gain += sample.efficiency_gain;
        self.accrued_value_secs += sample.efficiency_gain * sample.baseline.as_secs_f64();
        self.coordination_cost_secs += sample.agents_used as f64 * sample.elapsed.as_secs_f64();
    }
}

/// One execution's contribution to the table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSample {
    pub success: bool,
    pub elapsed: Duration,
    /// Sum of individual agent call durations.
    pub baseline: Duration,
    pub agents_used: usize,
    pub efficiency_gain: f64,
}

impl ExecutionSample {
    /// Gain of a run that took `elapsed` against a sequential `baseline`:
    /// `max(0, (baseline - elapsed) / baseline)`.
    pub fn efficiency_gain(baseline: Duration, elapsed: Duration) -> f64 {
        let baseline = baseline.as_secs_f64();
        if baseline <= 0.0 {
            return 0.0;
        }
        ((baseline - elapsed.as_secs_f64()) / baseline).clamp(0.0, 1.0)
    }
}

/// Whole-engine summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Mean efficiency gain over every recorded execution.
    pub overall_efficiency_gain: f64,
    pub overall_roi: f64,
    /// Executed pattern with the highest ROI; ties go to canonical order.
    pub best_pattern: Option<PatternKind>,
    pub total_executions: u64,
    pub patterns: BTreeMap<PatternKind, PatternMetrics>,
    pub generated_at: DateTime<Utc>,
}

/// Metrics keyed by pattern.
#[derive(Debug, Default)]
pub struct PatternMetricsTable {
    inner: Mutex<BTreeMap<PatternKind, PatternMetrics>>,
}

impl PatternMetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pattern: PatternKind, sample: &ExecutionSample) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(pattern)
            .or_default()
            .record(sample);
        tracing::trace!(metric = "pattern_execution", pattern = %pattern, "execution recorded");
    }

    /// Metrics for `pattern`; `None` before its first execution.
    pub fn get(&self, pattern: PatternKind) -> Option<PatternMetrics> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pattern)
            .cloned()
    }

    pub fn roi(&self, pattern: PatternKind) -> f64 {
        self.get(pattern).map_or(0.0, |m| m.roi())
    }

    pub fn snapshot(&self) -> BTreeMap<PatternKind, PatternMetrics> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn report(&self) -> PerformanceReport {
        let patterns = self.snapshot();
        let total_executions: u64 = patterns.values().map(|m| m.total_executions).sum();
        let total_gain: f64 = patterns.values().map(|m| m.total_efficiency_gain).sum();
        let value: f64 = patterns.values().map(|m| m.accrued_value_secs).sum();
        let cost: f64 = patterns.values().map(|m| m.coordination_cost_secs).sum();

        // BTreeMap iterates in canonical order; only a strictly higher ROI
        // displaces the current best.
        let mut best: Option<(PatternKind, f64)> = None;
        for (kind, metrics) in &patterns {
            let roi = metrics.roi();
            if best.map_or(true, |(_, best_roi)| roi > best_roi) {
                best = Some((*kind, roi));
            }
        }

        PerformanceReport {
            overall_efficiency_gain: ratio(total_gain, total_executions as f64),
            overall_roi: ratio(value, cost),
            best_pattern: best.map(|(kind, _)| kind),
            total_executions,
            patterns,
            generated_at: Utc::now(),
        }
    }

    /// Emit every pattern's counters as one `info!` event.
    pub fn flush(&self) {
        let patterns = self.snapshot();
        let summary: BTreeMap<&str, (u64, u64, f64)> = patterns
            .iter()
            .map(|(kind, m)| {
                let counts = (m.total_executions, m.successful_executions, m.roi());
                (kind.as_str(), counts)
            })
            .collect();
        tracing::info!(
            metric = "flush",
            patterns = patterns.len(),
            total_executions = patterns.values().map(|m| m.total_executions).sum::<u64>(),
            table = ?summary,
        );
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(success: bool, elapsed_ms: u64, baseline_ms: u64, agents: usize) -> ExecutionSample {
        let elapsed = Duration::from_millis(elapsed_ms);
        let baseline = Duration::from_millis(baseline_ms);
        ExecutionSample {
            success,
            elapsed,
            baseline,
            agents_used: agents,
            efficiency_gain: ExecutionSample::efficiency_gain(baseline, elapsed),
        }
    }

    #[test]
    fn test_efficiency_gain_is_floored() {
        let gain = ExecutionSample::efficiency_gain(Duration::from_secs(4), Duration::from_secs(1));
        assert!((gain - 0.75).abs() < 1e-9);
        assert_eq!(
            ExecutionSample::efficiency_gain(Duration::from_secs(1), Duration::from_secs(2)),
            0.0
        );
        assert_eq!(
            ExecutionSample::efficiency_gain(Duration::ZERO, Duration::from_secs(1)),
            0.0
        );
    }

    #[test]
    fn test_record_accumulates() {
        let table = PatternMetricsTable::new();
        assert!(table.get(PatternKind::Parallel).is_none());
        assert_eq!(table.roi(PatternKind::Parallel), 0.0);

        table.record(PatternKind::Parallel, &sample(true, 1000, 4000, 4));
        table.record(PatternKind::Parallel, &sample(false, 3000, 0, 0));

        let m = table.get(PatternKind::Parallel).unwrap();
        assert_eq!(m.total_executions, 2);
        assert_eq!(m.successful_executions, 1);
        assert_eq!(m.success_rate, 0.5);
        assert_eq!(m.average_execution_time, Duration::from_millis(2000));
        // value: 0.75 * 4s = 3; cost: 4 agents * 1s = 4
        assert!((m.roi() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_report_picks_highest_roi_with_canonical_ties() {
        let table = PatternMetricsTable::new();
        table.record(PatternKind::Competitive, &sample(true, 1000, 3000, 3));
        table.record(PatternKind::Parallel, &sample(true, 1000, 2000, 2));
        table.record(PatternKind::Sequential, &sample(true, 1000, 1000, 1));

        let report = table.report();
        // parallel: 0.5*2/2 = 0.5; competitive: (2/3)*3/3 ≈ 0.667
        assert_eq!(report.best_pattern, Some(PatternKind::Competitive));
        assert_eq!(report.total_executions, 3);

        let tied = PatternMetricsTable::new();
        tied.record(PatternKind::Routing, &sample(true, 1000, 1000, 1));
        tied.record(PatternKind::Sequential, &sample(true, 1000, 1000, 1));
        assert_eq!(tied.report().best_pattern, Some(PatternKind::Sequential));
    }

    #[test]
    fn test_empty_report() {
        let report = PatternMetricsTable::new().report();
        assert_eq!(report.best_pattern, None);
        assert_eq!(report.overall_roi, 0.0);
        assert_eq!(report.overall_efficiency_gain, 0.0);
    }
}
