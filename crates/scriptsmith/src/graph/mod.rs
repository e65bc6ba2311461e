//! The orchestration graph: a sequential walk over generation, execution,
//! debugging and aggregation steps.

pub mod error;
pub mod node;
pub mod progress;
pub mod runner;
pub mod state;

pub use error::GraphError;
pub use node::{GraphVariant, NodeId};
pub use progress::{GraphEvent, NoopProgress, ProgressReporter};
pub use runner::{Graph, GraphRun};
pub use state::{GenerationState, StateDelta};
