use serde::{Deserialize, Serialize};

use crate::capability::{ExecutionOutcome, GeneratedCode};
use crate::config::Browser;
use crate::extract::{ExtractedProject, Framework};
use crate::stats::StatsSummary;

/// The record threaded through one graph run.
///
/// `requirement`, `browser`, `extracted_code` and `framework` are inputs and
/// are never touched by a node. Every other field starts absent and is filled
/// in by [`StateDelta`]s; once present a field is never cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    pub requirement: String,
    pub browser: Browser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playwright_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_outcome: Option<ExecutionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_stats: Option<StatsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_stats_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_code: Option<ExtractedProject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<GeneratedCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_instructions: Option<String>,
}

impl GenerationState {
    pub fn new(requirement: impl Into<String>, browser: Browser) -> Self {
        Self {
            requirement: requirement.into(),
            browser,
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: ExtractedProject, framework: Framework) -> Self {
        self.extracted_code = Some(project);
        self.framework = Some(framework);
        self
    }

    /// Folds a node's output into the state, last writer wins per field.
    pub fn apply(&mut self, delta: StateDelta) {
        let StateDelta {
            playwright_script,
            execution_result,
            execution_outcome,
            analysis,
            test_stats,
            test_stats_report,
            generated_code,
            integration_instructions,
        } = delta;

        merge(&mut self.playwright_script, playwright_script);
        merge(&mut self.execution_result, execution_result);
        merge(&mut self.execution_outcome, execution_outcome);
        merge(&mut self.analysis, analysis);
        merge(&mut self.test_stats, test_stats);
        merge(&mut self.test_stats_report, test_stats_report);
        merge(&mut self.generated_code, generated_code);
        merge(&mut self.integration_instructions, integration_instructions);
    }

    pub fn failed(&self) -> bool {
        self.execution_outcome
            .as_ref()
            .is_some_and(ExecutionOutcome::is_failed)
    }
}

fn merge<T>(field: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *field = update;
    }
}

/// Partial update returned by a node. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub playwright_script: Option<String>,
    pub execution_result: Option<String>,
    pub execution_outcome: Option<ExecutionOutcome>,
    pub analysis: Option<String>,
    pub test_stats: Option<StatsSummary>,
    pub test_stats_report: Option<String>,
    pub generated_code: Option<GeneratedCode>,
    pub integration_instructions: Option<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_is_last_writer_wins() {
        let mut state = GenerationState::new("Add item to cart", Browser::Chromium);
        state.apply(StateDelta {
            playwright_script: Some("v1".into()),
            execution_outcome: Some(ExecutionOutcome::Failed("boom".into())),
            ..StateDelta::default()
        });
        state.apply(StateDelta {
            playwright_script: Some("v2".into()),
            analysis: Some("selector changed".into()),
            ..StateDelta::default()
        });

        assert_eq!(state.playwright_script.as_deref(), Some("v2"));
        assert_eq!(state.analysis.as_deref(), Some("selector changed"));
        assert!(state.failed());
    }

    #[test]
    fn test_empty_delta_never_removes_fields() {
        let mut state = GenerationState::new("Search for a laptop", Browser::Firefox);
        state.apply(StateDelta {
            execution_result: Some("[PASS] ok".into()),
            ..StateDelta::default()
        });
        let before = state.clone();
        state.apply(StateDelta::default());
        assert_eq!(state, before);
        assert!(StateDelta::default().is_empty());
    }

    #[test]
    fn test_with_project_sets_inputs() {
        let state = GenerationState::new("Add a wishlist page", Browser::Webkit)
            .with_project(ExtractedProject::default(), Framework::Flask);
        assert_eq!(state.framework, Some(Framework::Flask));
        assert!(state.extracted_code.is_some());
        assert!(!state.failed());
    }

    #[test]
    fn test_serializes_without_absent_fields() {
        let state = GenerationState::new("Search for a laptop", Browser::Chromium);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["requirement"], "Search for a laptop");
        assert_eq!(json["browser"], "chromium");
        assert!(json.get("playwright_script").is_none());
    }
}
