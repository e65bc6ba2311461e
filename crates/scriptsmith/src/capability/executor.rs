use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{Browser, ExecutorConfig};
use crate::error::CapabilityError;
use crate::stats::{extract_stats_block, FAIL_SENTINEL, PASS_SENTINEL};

/// Tagged result of one script run; drives the debug branch of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Passed,
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed(_))
    }

    pub fn sentinel(&self) -> &'static str {
        match self {
            ExecutionOutcome::Passed => PASS_SENTINEL,
            ExecutionOutcome::Failed(_) => FAIL_SENTINEL,
        }
    }
}

/// Transcript plus outcome of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Human-readable output; always contains a `[PASS]` or `[FAIL]` sentinel.
    pub transcript: String,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    pub fn passed(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            outcome: ExecutionOutcome::Passed,
        }
    }

    pub fn failed(transcript: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            outcome: ExecutionOutcome::Failed(reason.into()),
        }
    }
}

/// Runs a browser-automation script against the given browser backend.
///
/// Failed assertions are reported through [`ExecutionOutcome::Failed`]; an
/// `Err` means the script could not be run at all.
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, script: &str, browser: Browser) -> Result<ExecutionReport, CapabilityError>;
}

/// Environment variable carrying the browser name into the script process.
pub const BROWSER_ENV: &str = "SCRIPTSMITH_BROWSER";
/// Environment variable carrying the headless flag into the script process.
pub const HEADLESS_ENV: &str = "SCRIPTSMITH_HEADLESS";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executes scripts in a child interpreter process with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct ProcessScriptExecutor {
    interpreter: String,
    timeout: Duration,
    headless: bool,
}

impl ProcessScriptExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            headless: config.headless,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn write_script(&self, script: &str) -> Result<tempfile::NamedTempFile, CapabilityError> {
        let mut file = tempfile::Builder::new()
            .prefix("scriptsmith-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| CapabilityError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;

        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| CapabilityError::Io {
                path: file.path().to_path_buf(),
                source: e,
            })?;

        Ok(file)
    }
}

impl ScriptExecutor for ProcessScriptExecutor {
    fn execute(&self, script: &str, browser: Browser) -> Result<ExecutionReport, CapabilityError> {
        let file = self.write_script(script)?;
        let script_path: PathBuf = file.path().to_path_buf();

        let started = Instant::now();
        let mut child = Command::new(&self.interpreter)
            .arg(&script_path)
            .env(BROWSER_ENV, browser.as_str())
            .env(HEADLESS_ENV, if self.headless { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CapabilityError::Launch(format!("{}: {}", self.interpreter, e)))?;

        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(
                        browser = %browser,
                        timeout_secs = self.timeout.as_secs(),
                        "Script run timed out"
                    );
                    return Err(CapabilityError::Timeout {
                        seconds: self.timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(CapabilityError::Launch(e.to_string())),
            }
        };

        let stdout = stdout_reader.map(join_reader).unwrap_or_default();
        let stderr = stderr_reader.map(join_reader).unwrap_or_default();

        tracing::debug!(
            browser = %browser,
            exit_code = status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Script process finished"
        );

        let failure = if !status.success() {
            Some(match status.code() {
                Some(code) => format!("script exited with status {}", code),
                None => "script terminated by signal".to_string(),
            })
        } else {
            failed_assertions(&stdout)
        };

        Ok(build_report(&stdout, &stderr, failure))
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Failure reason derived from the script's own stats block, if it reports any.
fn failed_assertions(stdout: &str) -> Option<String> {
    let stats = extract_stats_block(stdout).ok()?;
    if stats.assertions_failed > 0 {
        Some(format!(
            "{} of {} assertions failed",
            stats.assertions_failed, stats.total_assertions
        ))
    } else if let Some(first) = stats.errors.first() {
        Some(first.clone())
    } else {
        None
    }
}

fn build_report(stdout: &str, stderr: &str, failure: Option<String>) -> ExecutionReport {
    match failure {
        None => {
            let mut transcript = format!("{} Script executed successfully\n", PASS_SENTINEL);
            if !stdout.trim().is_empty() {
                transcript.push('\n');
                transcript.push_str(stdout);
            }
            ExecutionReport::passed(transcript)
        }
        Some(reason) => {
            let mut transcript = format!("{} {}\n", FAIL_SENTINEL, reason);
            if !stdout.trim().is_empty() {
                transcript.push_str("\nSTDOUT:\n");
                transcript.push_str(stdout);
            }
            if !stderr.trim().is_empty() {
                transcript.push_str("\nSTDERR:\n");
                transcript.push_str(stderr);
            }
            ExecutionReport::failed(transcript, reason)
        }
    }
}
