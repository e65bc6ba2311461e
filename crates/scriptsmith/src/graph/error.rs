use thiserror::Error;

use crate::error::CapabilityError;

use super::node::NodeId;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Step '{node}' failed: {source}")]
    Node {
        node: NodeId,
        #[source]
        source: CapabilityError,
    },

    #[error("Step '{node}' requires {field}, which no earlier step produced")]
    MissingInput { node: NodeId, field: &'static str },
}

impl GraphError {
    pub fn node(&self) -> NodeId {
        match self {
            GraphError::Node { node, .. } | GraphError::MissingInput { node, .. } => *node,
        }
    }
}
