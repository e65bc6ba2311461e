use super::node::NodeId;

/// Events emitted while a graph runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodeStarted { node: NodeId },
    NodeFinished { node: NodeId, elapsed_ms: u64 },
    Failed { node: NodeId, error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: GraphEvent);
}

/// No-op reporter for synchronous runs and unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: GraphEvent) {}
}
