use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::block::{extract_stats_block, TestStats};

pub const PASS_SENTINEL: &str = "[PASS]";
pub const FAIL_SENTINEL: &str = "[FAIL]";

/// Distribution summary of a list of durations (seconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
}

impl TimingSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let total: f64 = sorted.iter().sum();
        let count = sorted.len();
        Self {
            count,
            total,
            average: total / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
        }
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted[index]
}

/// Machine-readable run summary stored as `test_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub execution_time: f64,
    pub total_assertions: u32,
    pub assertions_passed: u32,
    pub assertions_failed: u32,
    /// Percentage of passed assertions, `0.0` when nothing was asserted.
    pub pass_rate: f64,
    pub step_coverage: Vec<String>,
    pub page_loads: TimingSummary,
    pub action_times: TimingSummary,
    pub accessibility_violations: u32,
    pub locator_retries: u32,
    pub errors: Vec<String>,
    /// `[PASS]` sentinels seen in the transcript.
    pub pass_markers: usize,
    /// `[FAIL]` sentinels seen in the transcript.
    pub fail_markers: usize,
}

impl StatsSummary {
    pub fn from_stats(stats: &TestStats, transcript: &str) -> Self {
        let pass_rate = if stats.total_assertions == 0 {
            0.0
        } else {
            f64::from(stats.assertions_passed) / f64::from(stats.total_assertions) * 100.0
        };

        Self {
            execution_time: stats.execution_time,
            total_assertions: stats.total_assertions,
            assertions_passed: stats.assertions_passed,
            assertions_failed: stats.assertions_failed,
            pass_rate,
            step_coverage: stats.step_coverage.clone(),
            page_loads: TimingSummary::from_samples(&stats.performance.page_loads),
            action_times: TimingSummary::from_samples(&stats.performance.action_times),
            accessibility_violations: stats.accessibility_violations,
            locator_retries: stats.locator_retries,
            errors: stats.errors.clone(),
            pass_markers: transcript.matches(PASS_SENTINEL).count(),
            fail_markers: transcript.matches(FAIL_SENTINEL).count(),
        }
    }

    /// Human-readable report stored as `test_stats_report`.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("Test Statistics\n");
        out.push_str("===============\n");
        let _ = writeln!(out, "Execution time: {:.2}s", self.execution_time);
        let _ = writeln!(
            out,
            "Assertions: {} total, {} passed, {} failed ({:.1}% pass rate)",
            self.total_assertions, self.assertions_passed, self.assertions_failed, self.pass_rate
        );

        if self.step_coverage.is_empty() {
            out.push_str("Steps completed: none\n");
        } else {
            let _ = writeln!(
                out,
                "Steps completed ({}): {}",
                self.step_coverage.len(),
                self.step_coverage.join(" -> ")
            );
        }

        write_timing(&mut out, "Page loads", &self.page_loads);
        write_timing(&mut out, "Actions", &self.action_times);

        let _ = writeln!(
            out,
            "Accessibility violations: {}",
            self.accessibility_violations
        );
        let _ = writeln!(out, "Locator retries: {}", self.locator_retries);

        if !self.errors.is_empty() {
            let _ = writeln!(out, "Errors ({}):", self.errors.len());
            for error in &self.errors {
                let _ = writeln!(out, "  - {}", error);
            }
        }

        out
    }
}

fn write_timing(out: &mut String, label: &str, timing: &TimingSummary) {
    if timing.count == 0 {
        let _ = writeln!(out, "{}: no samples", label);
        return;
    }
    let _ = writeln!(
        out,
        "{}: {} samples, avg {:.3}s, p50 {:.3}s, p95 {:.3}s, max {:.3}s",
        label, timing.count, timing.average, timing.p50, timing.p95, timing.max
    );
}

/// Result of aggregating one execution transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// `None` when the transcript carried no usable stats block.
    pub stats: Option<StatsSummary>,
    pub report: String,
}

/// Parses the transcript's stats block into a summary and report.
///
/// Never fails: a missing or malformed block yields `stats: None` and a
/// "No stats available" report naming the reason.
pub fn aggregate(transcript: &str) -> Aggregate {
    match extract_stats_block(transcript) {
        Ok(raw) => {
            let summary = StatsSummary::from_stats(&raw, transcript);
            let report = summary.render_report();
            Aggregate {
                stats: Some(summary),
                report,
            }
        }
        Err(e) => {
            tracing::debug!("No stats block in transcript: {}", e);
            Aggregate {
                stats: None,
                report: format!("No stats available ({}).", e),
            }
        }
    }
}
