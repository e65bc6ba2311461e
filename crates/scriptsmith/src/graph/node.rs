use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::GenerationState;

/// A step in one of the graph variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    CodeGenerator,
    IntegrationGuide,
    Script,
    Execute,
    Debug,
    Reexecute,
    Aggregate,
    Done,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::CodeGenerator => "code_generator",
            NodeId::IntegrationGuide => "integration_guide",
            NodeId::Script => "script",
            NodeId::Execute => "execute",
            NodeId::Debug => "debug",
            NodeId::Reexecute => "reexecute",
            NodeId::Aggregate => "aggregate",
            NodeId::Done => "done",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which graph to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphVariant {
    /// `script -> execute -> [debug -> reexecute] -> aggregate -> done`
    TestGeneration,
    /// `code_generator -> integration_guide -> script -> execute -> aggregate -> done`
    CodeGeneration,
}

impl GraphVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphVariant::TestGeneration => "test_generation",
            GraphVariant::CodeGeneration => "code_generation",
        }
    }

    pub fn entry(&self) -> NodeId {
        match self {
            GraphVariant::TestGeneration => NodeId::Script,
            GraphVariant::CodeGeneration => NodeId::CodeGenerator,
        }
    }

    /// The node following `node`, or `None` after the terminal node.
    ///
    /// The only conditional edge is `execute` in the test-generation graph,
    /// which dispatches on the recorded execution outcome.
    pub fn next(&self, node: NodeId, state: &GenerationState) -> Option<NodeId> {
        match (self, node) {
            (GraphVariant::TestGeneration, NodeId::Script) => Some(NodeId::Execute),
            (GraphVariant::TestGeneration, NodeId::Execute) => {
                if state.failed() {
                    Some(NodeId::Debug)
                } else {
                    Some(NodeId::Aggregate)
                }
            }
            (GraphVariant::TestGeneration, NodeId::Debug) => Some(NodeId::Reexecute),
            (GraphVariant::TestGeneration, NodeId::Reexecute) => Some(NodeId::Aggregate),

            (GraphVariant::CodeGeneration, NodeId::CodeGenerator) => Some(NodeId::IntegrationGuide),
            (GraphVariant::CodeGeneration, NodeId::IntegrationGuide) => Some(NodeId::Script),
            (GraphVariant::CodeGeneration, NodeId::Script) => Some(NodeId::Execute),
            (GraphVariant::CodeGeneration, NodeId::Execute) => Some(NodeId::Aggregate),

            (_, NodeId::Aggregate) => Some(NodeId::Done),
            _ => None,
        }
    }
}

impl fmt::Display for GraphVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ExecutionOutcome;
    use crate::config::Browser;

    fn walk(variant: GraphVariant, state: &GenerationState) -> Vec<NodeId> {
        let mut path = vec![variant.entry()];
        while let Some(next) = variant.next(*path.last().unwrap(), state) {
            path.push(next);
        }
        path
    }

    #[test]
    fn test_passing_path_skips_debug() {
        let mut state = GenerationState::new("Search for a laptop", Browser::Chromium);
        state.execution_outcome = Some(ExecutionOutcome::Passed);
        assert_eq!(
            walk(GraphVariant::TestGeneration, &state),
            vec![NodeId::Script, NodeId::Execute, NodeId::Aggregate, NodeId::Done]
        );
    }

    #[test]
    fn test_failing_path_visits_debug_once() {
        let mut state = GenerationState::new("Search for a laptop", Browser::Chromium);
        state.execution_outcome = Some(ExecutionOutcome::Failed("x".into()));
        assert_eq!(
            walk(GraphVariant::TestGeneration, &state),
            vec![
                NodeId::Script,
                NodeId::Execute,
                NodeId::Debug,
                NodeId::Reexecute,
                NodeId::Aggregate,
                NodeId::Done
            ]
        );
    }

    #[test]
    fn test_code_generation_is_linear_even_on_failure() {
        let mut state = GenerationState::new("Add a wishlist page", Browser::Chromium);
        state.execution_outcome = Some(ExecutionOutcome::Failed("x".into()));
        assert_eq!(
            walk(GraphVariant::CodeGeneration, &state),
            vec![
                NodeId::CodeGenerator,
                NodeId::IntegrationGuide,
                NodeId::Script,
                NodeId::Execute,
                NodeId::Aggregate,
                NodeId::Done
            ]
        );
    }

    #[test]
    fn test_node_names() {
        assert_eq!(NodeId::IntegrationGuide.to_string(), "integration_guide");
        assert_eq!(
            serde_json::to_string(&NodeId::CodeGenerator).unwrap(),
            "\"code_generator\""
        );
    }
}
