use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::stats::{TestStats, FAIL_SENTINEL, PASS_SENTINEL};

/// Collects assertion counts, timings and transcript lines for one run.
#[derive(Debug)]
pub struct RunRecorder {
    started: Instant,
    stats: TestStats,
    lines: Vec<String>,
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stats: TestStats::default(),
            lines: Vec::new(),
        }
    }

    /// Evaluates one assertion.
    ///
    /// `Ok(false)` is a failed assertion; `Err` or a panic inside `check` is an
    /// unexpected error. Both are counted and recorded; neither propagates.
    pub fn check<F>(&mut self, description: &str, check: F) -> bool
    where
        F: FnOnce() -> Result<bool, String>,
    {
        self.stats.total_assertions += 1;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(check)) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref())),
        };

        match outcome {
            Ok(true) => {
                self.stats.assertions_passed += 1;
                self.lines.push(format!("{} {}", PASS_SENTINEL, description));
                true
            }
            Ok(false) => {
                self.stats.assertions_failed += 1;
                let message = format!("Assertion Failed: {}", description);
                self.lines.push(format!("{} {}", FAIL_SENTINEL, description));
                self.stats.errors.push(message);
                false
            }
            Err(e) => {
                self.stats.assertions_failed += 1;
                let message = format!("Unexpected error in '{}': {}", description, e);
                self.lines.push(format!("{} {}", FAIL_SENTINEL, message));
                self.stats.errors.push(message);
                false
            }
        }
    }

    /// Times `action` and records its duration.
    pub fn action<T>(&mut self, name: &str, action: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = action();
        let elapsed = start.elapsed().as_secs_f64();
        self.stats.performance.action_times.push(elapsed);
        tracing::trace!(action = name, elapsed_secs = elapsed, "Action timed");
        value
    }

    pub fn record_page_load(&mut self, seconds: f64) {
        self.stats.performance.page_loads.push(seconds);
    }

    pub fn record_locator_retry(&mut self) {
        self.stats.locator_retries += 1;
    }

    pub fn record_accessibility_violations(&mut self, count: u32) {
        self.stats.accessibility_violations += count;
    }

    pub fn complete_step(&mut self, name: &str) {
        self.stats.step_coverage.push(name.to_string());
        self.lines.push(format!("Step completed: {}", name));
    }

    /// Records an error outside any assertion; the run is marked failed.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.lines.push(format!("{} {}", FAIL_SENTINEL, message));
        self.stats.errors.push(message);
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn stats(&self) -> &TestStats {
        &self.stats
    }

    /// Stops the clock and returns the transcript lines and final stats.
    pub fn finish(mut self) -> (Vec<String>, TestStats) {
        self.stats.execution_time = self.started.elapsed().as_secs_f64();
        (self.lines, self.stats)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
