//! The structured stats block embedded in execution transcripts.
//!
//! Scripts print a JSON object between two sentinel lines so the caller can
//! pull exactly the structured payload out of mixed log output:
//!
//! ```text
//! STATS_JSON_START
//! { "execution_time": 3.2, ... }
//! STATS_JSON_END
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATS_JSON_START: &str = "STATS_JSON_START";
pub const STATS_JSON_END: &str = "STATS_JSON_END";

/// Raw statistics as emitted by an automation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestStats {
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub assertions_passed: u32,
    #[serde(default)]
    pub assertions_failed: u32,
    #[serde(default)]
    pub total_assertions: u32,
    #[serde(default)]
    pub step_coverage: Vec<String>,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub accessibility_violations: u32,
    #[serde(default)]
    pub locator_retries: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Page load durations in seconds.
    #[serde(default)]
    pub page_loads: Vec<f64>,
    /// Discrete action durations in seconds.
    #[serde(default)]
    pub action_times: Vec<f64>,
}

impl TestStats {
    /// True when the run recorded no failed assertion and no error.
    pub fn is_clean(&self) -> bool {
        self.assertions_failed == 0 && self.errors.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum StatsBlockError {
    #[error("no STATS_JSON_START marker in output")]
    Missing,

    #[error("STATS_JSON_START marker is not followed by STATS_JSON_END")]
    Unterminated,

    #[error("stats block is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Extracts the last complete stats block from a transcript.
///
/// Markers must stand on their own line (surrounding whitespace is ignored).
/// When a script prints several blocks the last one wins.
pub fn extract_stats_block(transcript: &str) -> Result<TestStats, StatsBlockError> {
    let lines: Vec<&str> = transcript.lines().collect();

    let start = lines
        .iter()
        .rposition(|line| line.trim() == STATS_JSON_START)
        .ok_or(StatsBlockError::Missing)?;

    let body_len = lines[start + 1..]
        .iter()
        .position(|line| line.trim() == STATS_JSON_END)
        .ok_or(StatsBlockError::Unterminated)?;

    let body = lines[start + 1..start + 1 + body_len].join("\n");
    Ok(serde_json::from_str(&body)?)
}

/// Renders stats as a sentinel-delimited block, newline terminated.
pub fn render_stats_block(stats: &TestStats) -> String {
    let json = serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string());
    format!("{STATS_JSON_START}\n{json}\n{STATS_JSON_END}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON_STYLE_OUTPUT: &str = r#"Launching chromium...
some log line
STATS_JSON_START
{
    "execution_time": 7.25,
    "assertions_passed": 5,
    "assertions_failed": 1,
    "total_assertions": 6,
    "step_coverage": ["Navigate to Login Page", "Login"],
    "performance": {
        "page_loads": [1.5, 0.75],
        "action_times": [0.1, 0.2, 0.3]
    },
    "accessibility_violations": 0,
    "locator_retries": 2,
    "errors": ["Assertion Failed: expected visible"]
}
STATS_JSON_END
trailing noise
"#;

    #[test]
    fn test_extract_recovers_embedded_counts() {
        let stats = extract_stats_block(PYTHON_STYLE_OUTPUT).unwrap();
        assert_eq!(stats.total_assertions, 6);
        assert_eq!(stats.assertions_passed, 5);
        assert_eq!(stats.assertions_failed, 1);
        assert_eq!(
            stats.total_assertions,
            stats.assertions_passed + stats.assertions_failed
        );
        assert_eq!(stats.step_coverage, vec!["Navigate to Login Page", "Login"]);
        assert_eq!(stats.performance.page_loads, vec![1.5, 0.75]);
        assert_eq!(stats.performance.action_times.len(), 3);
        assert_eq!(stats.locator_retries, 2);
        assert_eq!(stats.errors.len(), 1);
        assert!(!stats.is_clean());
    }

    #[test]
    fn test_missing_block() {
        let result = extract_stats_block("[PASS] nothing structured here");
        assert!(matches!(result, Err(StatsBlockError::Missing)));
    }

    #[test]
    fn test_unterminated_block() {
        let result = extract_stats_block("STATS_JSON_START\n{\"execution_time\": 1.0}\n");
        assert!(matches!(result, Err(StatsBlockError::Unterminated)));
    }

    #[test]
    fn test_malformed_block() {
        let result = extract_stats_block("STATS_JSON_START\n{ broken\nSTATS_JSON_END\n");
        assert!(matches!(result, Err(StatsBlockError::Malformed(_))));
    }

    #[test]
    fn test_missing_fields_default() {
        let stats =
            extract_stats_block("STATS_JSON_START\n{\"assertions_passed\": 3}\nSTATS_JSON_END")
                .unwrap();
        assert_eq!(stats.assertions_passed, 3);
        assert_eq!(stats.total_assertions, 0);
        assert!(stats.performance.page_loads.is_empty());
    }

    #[test]
    fn test_last_block_wins() {
        let transcript = "STATS_JSON_START\n{\"total_assertions\": 1}\nSTATS_JSON_END\n\
                          STATS_JSON_START\n{\"total_assertions\": 9}\nSTATS_JSON_END\n";
        let stats = extract_stats_block(transcript).unwrap();
        assert_eq!(stats.total_assertions, 9);
    }

    #[test]
    fn test_rendered_block_is_extractable() {
        let stats = TestStats {
            execution_time: 2.0,
            assertions_passed: 2,
            total_assertions: 2,
            step_coverage: vec!["Open".to_string()],
            ..TestStats::default()
        };
        let rendered = render_stats_block(&stats);
        assert!(rendered.starts_with(STATS_JSON_START));
        assert!(rendered.trim_end().ends_with(STATS_JSON_END));

        let mixed = format!("[PASS] run ok\n{rendered}more output\n");
        assert_eq!(extract_stats_block(&mixed).unwrap(), stats);
    }
}
