use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::capability::{Capabilities, DebugRequest, ExecutionOutcome, ScriptRequest};
use crate::extract::Framework;
use crate::sanitize;
use crate::stats;

use super::error::GraphError;
use super::node::{GraphVariant, NodeId};
use super::progress::{GraphEvent, ProgressReporter};
use super::state::{GenerationState, StateDelta};

/// Final state of a completed walk plus the nodes visited, in order.
#[derive(Debug, Clone)]
pub struct GraphRun {
    pub state: GenerationState,
    pub visited: Vec<NodeId>,
}

impl GraphRun {
    pub fn visit_count(&self, node: NodeId) -> usize {
        self.visited.iter().filter(|n| **n == node).count()
    }
}

/// Walks a graph variant over a [`GenerationState`].
///
/// The graph persists nothing. A node error aborts the walk and is returned
/// as-is; the partially built state is dropped.
pub struct Graph {
    capabilities: Capabilities,
}

impl Graph {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn run(
        &self,
        variant: GraphVariant,
        mut state: GenerationState,
        progress: &dyn ProgressReporter,
    ) -> Result<GraphRun, GraphError> {
        let run_id = uuid::Uuid::new_v4();
        let _graph_span = info_span!("graph",
            variant = %variant,
            run_id = %run_id,
            browser = %state.browser,
            requirement = %sanitize::truncate_for_span(&state.requirement),
            requirement_hash = %sanitize::hash_text(&state.requirement),
        )
        .entered();

        let started = Instant::now();
        let mut visited = Vec::new();
        let mut current = Some(variant.entry());

        while let Some(node) = current {
            let _node_span = info_span!("node", node = node.as_str()).entered();
            progress.report(GraphEvent::NodeStarted { node });
            let node_started = Instant::now();

            let delta = match self.run_node(node, &state) {
                Ok(delta) => delta,
                Err(e) => {
                    warn!(node = node.as_str(), error = %e, "Graph step failed");
                    progress.report(GraphEvent::Failed {
                        node,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            state.apply(delta);
            visited.push(node);

            let elapsed_ms = node_started.elapsed().as_millis() as u64;
            debug!(node = node.as_str(), elapsed_ms, "Graph step finished");
            progress.report(GraphEvent::NodeFinished { node, elapsed_ms });

            current = variant.next(node, &state);
        }

        info!(
            steps = visited.len(),
            failed = state.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Graph run complete"
        );

        Ok(GraphRun { state, visited })
    }

    fn run_node(&self, node: NodeId, state: &GenerationState) -> Result<StateDelta, GraphError> {
        match node {
            NodeId::CodeGenerator => self.step_generate_code(state),
            NodeId::IntegrationGuide => self.step_integration_guide(state),
            NodeId::Script => self.step_script(state),
            NodeId::Execute | NodeId::Reexecute => self.step_execute(node, state),
            NodeId::Debug => self.step_debug(state),
            NodeId::Aggregate => self.step_aggregate(state),
            NodeId::Done => Ok(StateDelta::default()),
        }
    }

    fn step_generate_code(&self, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let node = NodeId::CodeGenerator;
        let project = state.extracted_code.as_ref().ok_or(GraphError::MissingInput {
            node,
            field: "extracted_code",
        })?;
        let framework = state.framework.unwrap_or(Framework::Unknown);

        let code = self
            .capabilities
            .code_generator
            .generate_code(&state.requirement, project, framework)
            .map_err(|source| GraphError::Node { node, source })?;

        debug!(categories = code.categories().count(), "Generated code");
        Ok(StateDelta {
            generated_code: Some(code),
            ..StateDelta::default()
        })
    }

    fn step_integration_guide(&self, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let node = NodeId::IntegrationGuide;
        let code = state.generated_code.as_ref().ok_or(GraphError::MissingInput {
            node,
            field: "generated_code",
        })?;
        let framework = state.framework.unwrap_or(Framework::Unknown);

        let guide = self
            .capabilities
            .integration_guide
            .integration_guide(&state.requirement, code, framework)
            .map_err(|source| GraphError::Node { node, source })?;

        Ok(StateDelta {
            integration_instructions: Some(guide),
            ..StateDelta::default()
        })
    }

    fn step_script(&self, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let node = NodeId::Script;
        let request = ScriptRequest {
            requirement: &state.requirement,
            browser: state.browser,
            project: state.extracted_code.as_ref(),
            generated_code: state.generated_code.as_ref(),
        };

        let script = self
            .capabilities
            .script_generator
            .generate_script(&request)
            .map_err(|source| GraphError::Node { node, source })?;

        if script.trim().is_empty() {
            return Err(GraphError::Node {
                node,
                source: crate::error::CapabilityError::EmptyResponse,
            });
        }

        Ok(StateDelta {
            playwright_script: Some(script),
            ..StateDelta::default()
        })
    }

    fn step_execute(&self, node: NodeId, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let script = state.playwright_script.as_deref().ok_or(GraphError::MissingInput {
            node,
            field: "playwright_script",
        })?;

        let report = self
            .capabilities
            .executor
            .execute(script, state.browser)
            .map_err(|source| GraphError::Node { node, source })?;

        match &report.outcome {
            ExecutionOutcome::Passed => info!(node = node.as_str(), "Script passed"),
            ExecutionOutcome::Failed(reason) => {
                info!(node = node.as_str(), reason = %reason, "Script failed")
            }
        }

        Ok(StateDelta {
            execution_result: Some(report.transcript),
            execution_outcome: Some(report.outcome),
            ..StateDelta::default()
        })
    }

    fn step_debug(&self, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let node = NodeId::Debug;
        let script = state.playwright_script.as_deref().ok_or(GraphError::MissingInput {
            node,
            field: "playwright_script",
        })?;
        let transcript = state.execution_result.as_deref().ok_or(GraphError::MissingInput {
            node,
            field: "execution_result",
        })?;
        let reason = match &state.execution_outcome {
            Some(ExecutionOutcome::Failed(reason)) => reason.as_str(),
            _ => "the run reported a failure",
        };

        let result = self
            .capabilities
            .debugger
            .debug_script(&DebugRequest {
                requirement: &state.requirement,
                script,
                transcript,
                reason,
            })
            .map_err(|source| GraphError::Node { node, source })?;

        Ok(StateDelta {
            playwright_script: Some(result.script),
            analysis: Some(result.analysis),
            ..StateDelta::default()
        })
    }

    fn step_aggregate(&self, state: &GenerationState) -> Result<StateDelta, GraphError> {
        let transcript = state.execution_result.as_deref().ok_or(GraphError::MissingInput {
            node: NodeId::Aggregate,
            field: "execution_result",
        })?;

        let aggregate = stats::aggregate(transcript);
        Ok(StateDelta {
            test_stats: aggregate.stats,
            test_stats_report: Some(aggregate.report),
            ..StateDelta::default()
        })
    }
}
