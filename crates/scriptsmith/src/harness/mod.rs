//! In-process scenario harness.
//!
//! Runs a scenario against a [`BrowserSession`], counting assertions and timing
//! page loads and actions, and renders the same transcript and stats block a
//! generated script prints. Assertion failures never abort a run; only a
//! navigation failure or an error returned by the scenario does. The session is
//! closed on every path.

pub mod recorder;
pub mod session;

use std::time::{Duration, Instant};

pub use recorder::RunRecorder;
pub use session::{BrowserSession, SessionGuard};

use crate::capability::ExecutionReport;
use crate::error::CapabilityError;
use crate::stats::{render_stats_block, FAIL_SENTINEL, PASS_SENTINEL};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle passed to a scenario body.
pub struct ScenarioContext<'a, S: BrowserSession> {
    session: &'a mut S,
    recorder: &'a mut RunRecorder,
    idle_timeout: Duration,
}

impl<S: BrowserSession> ScenarioContext<'_, S> {
    /// Navigates and waits for network idle, recording the page load.
    ///
    /// A failed navigation aborts the scenario. An idle wait that times out is
    /// recorded as an error and the scenario continues.
    pub fn navigate(&mut self, url: &str) -> Result<(), CapabilityError> {
        let start = Instant::now();
        self.session.navigate(url)?;
        if let Err(e) = self.session.wait_for_idle(self.idle_timeout) {
            self.recorder
                .record_error(format!("Page did not settle after loading {}: {}", url, e));
        }
        self.recorder.record_page_load(start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn check<F>(&mut self, description: &str, check: F) -> bool
    where
        F: FnOnce(&mut S) -> Result<bool, String>,
    {
        let session = &mut *self.session;
        self.recorder.check(description, || check(session))
    }

    pub fn action<T>(&mut self, name: &str, action: impl FnOnce(&mut S) -> T) -> T {
        let session = &mut *self.session;
        self.recorder.action(name, || action(session))
    }

    pub fn step(&mut self, name: &str) {
        self.recorder.complete_step(name);
    }

    pub fn recorder(&mut self) -> &mut RunRecorder {
        self.recorder
    }
}

/// Runs scenarios with a bounded idle wait per navigation.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    idle_timeout: Duration,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl ScenarioRunner {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn run<S, F>(&self, session: S, scenario: F) -> Result<ExecutionReport, CapabilityError>
    where
        S: BrowserSession,
        F: FnOnce(&mut ScenarioContext<'_, S>) -> Result<(), CapabilityError>,
    {
        let mut guard = SessionGuard::new(session);
        let mut recorder = RunRecorder::new();

        let result = {
            let mut ctx = ScenarioContext {
                session: &mut *guard,
                recorder: &mut recorder,
                idle_timeout: self.idle_timeout,
            };
            scenario(&mut ctx)
        };
        drop(guard);

        if let Err(e) = result {
            tracing::warn!(error = %e, "Scenario aborted");
            return Err(e);
        }

        Ok(render_report(recorder))
    }
}

/// Builds the transcript and outcome for a finished run.
pub fn render_report(recorder: RunRecorder) -> ExecutionReport {
    let (lines, stats) = recorder.finish();

    let failure = if stats.assertions_failed > 0 {
        Some(format!(
            "{} of {} assertions failed",
            stats.assertions_failed, stats.total_assertions
        ))
    } else {
        stats.errors.first().cloned()
    };

    let mut transcript = lines.join("\n");
    if !transcript.is_empty() {
        transcript.push('\n');
    }
    match &failure {
        Some(reason) => transcript.push_str(&format!("{} {}\n", FAIL_SENTINEL, reason)),
        None => transcript.push_str(&format!(
            "{} All {} assertions passed\n",
            PASS_SENTINEL, stats.total_assertions
        )),
    }
    transcript.push_str(&render_stats_block(&stats));

    match failure {
        Some(reason) => ExecutionReport::failed(transcript, reason),
        None => ExecutionReport::passed(transcript),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ExecutionOutcome;
    use crate::stats::extract_stats_block;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSession {
        closes: Arc<AtomicUsize>,
        fail_navigation: bool,
        idle_times_out: bool,
        title: String,
    }

    impl FakeSession {
        fn new(closes: &Arc<AtomicUsize>) -> Self {
            Self {
                closes: Arc::clone(closes),
                fail_navigation: false,
                idle_times_out: false,
                title: "Amazon.com. Spend less. Smile more.".to_string(),
            }
        }
    }

    impl BrowserSession for FakeSession {
        fn navigate(&mut self, url: &str) -> Result<(), CapabilityError> {
            if self.fail_navigation {
                Err(CapabilityError::Session(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))
            } else {
                Ok(())
            }
        }

        fn wait_for_idle(&mut self, timeout: Duration) -> Result<(), CapabilityError> {
            if self.idle_times_out {
                Err(CapabilityError::Timeout {
                    seconds: timeout.as_secs(),
                })
            } else {
                Ok(())
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_passing_scenario() {
        let closes = Arc::new(AtomicUsize::new(0));
        let report = ScenarioRunner::default()
            .run(FakeSession::new(&closes), |ctx| {
                ctx.navigate("https://www.amazon.com")?;
                ctx.step("Open home page");
                ctx.check("title mentions Amazon", |s| Ok(s.title.contains("Amazon")));
                ctx.action("click sign in", |_| ());
                ctx.step("Open sign-in");
                Ok(())
            })
            .unwrap();

        assert_eq!(report.outcome, ExecutionOutcome::Passed);
        assert!(report.transcript.contains("[PASS] All 1 assertions passed"));
        let stats = extract_stats_block(&report.transcript).unwrap();
        assert_eq!(stats.step_coverage, vec!["Open home page", "Open sign-in"]);
        assert_eq!(stats.performance.page_loads.len(), 1);
        assert_eq!(stats.performance.action_times.len(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_assertions_do_not_abort() {
        let closes = Arc::new(AtomicUsize::new(0));
        let report = ScenarioRunner::default()
            .run(FakeSession::new(&closes), |ctx| {
                ctx.navigate("https://www.amazon.com")?;
                ctx.check("cart is empty", |_| Ok(false));
                ctx.check("search box works", |_| Err("timeout waiting for #twotabsearchtextbox".into()));
                ctx.check("footer visible", |_| Ok(true));
                ctx.step("Reached the end");
                Ok(())
            })
            .unwrap();

        assert_eq!(
            report.outcome,
            ExecutionOutcome::Failed("2 of 3 assertions failed".into())
        );
        let stats = extract_stats_block(&report.transcript).unwrap();
        assert_eq!(stats.total_assertions, 3);
        assert_eq!(stats.assertions_passed + stats.assertions_failed, 3);
        assert_eq!(stats.errors.len(), 2);
        assert_eq!(stats.step_coverage, vec!["Reached the end"]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_navigation_failure_aborts_and_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut session = FakeSession::new(&closes);
        session.fail_navigation = true;

        let mut reached = false;
        let err = ScenarioRunner::default()
            .run(session, |ctx| {
                ctx.navigate("https://unreachable.invalid")?;
                reached = true;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, CapabilityError::Session(_)));
        assert!(!reached);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_timeout_is_recorded_not_fatal() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut session = FakeSession::new(&closes);
        session.idle_times_out = true;

        let report = ScenarioRunner::new(Duration::from_secs(5))
            .run(session, |ctx| {
                ctx.navigate("https://www.amazon.com")?;
                ctx.check("title", |_| Ok(true));
                Ok(())
            })
            .unwrap();

        assert!(report.outcome.is_failed());
        assert!(report.transcript.contains("Page did not settle"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_closed_when_scenario_panics() {
        let closes = Arc::new(AtomicUsize::new(0));
        let session = FakeSession::new(&closes);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ScenarioRunner::default().run(session, |_ctx| -> Result<(), CapabilityError> {
                panic!("scenario bug")
            });
        }));
        assert!(result.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
