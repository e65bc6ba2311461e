pub mod access;
pub mod broadcast;
pub mod capability;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod graph;
pub mod harness;
pub mod history;
pub mod requirement;
pub mod sanitize;
pub mod service;
pub mod stats;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use access::{Operation, Role, User};
pub use broadcast::{TaskProgressBroadcaster, TaskProgressEvent};
pub use capability::Capabilities;
pub use config::{load_config, Browser, Config};
pub use error::{CapabilityError, ConfigError, Result, ScriptsmithError, ValidationError, WorkerError};
pub use graph::{GenerationState, Graph, GraphVariant, NodeId};
pub use history::HistoryRecord;
pub use service::{register_user, GenerationRun, Orchestrator, Records, ScriptAttachment};
pub use task::{TaskHandle, TaskState, TaskStatus};
pub use worker::{CodeGenerationResult, ProjectSource};
