//! Task status protocol for asynchronous jobs.
//!
//! `PENDING -> PROGRESS* -> (SUCCESS | FAILURE)`. The worker writes through
//! [`TaskStore`]; pollers read through [`TaskTracker`].

mod error;
mod state;
mod store;
mod tracker;

pub use error::TaskError;
pub use state::{TaskHandle, TaskState, TaskStatus};
pub use store::{
    RecoveredTask, TaskRecord, TaskStore, HEARTBEAT_INTERVAL, INTERRUPTED_ERROR, OWNER_TIMEOUT_SECS,
    QUEUED_MESSAGE,
};
pub use tracker::TaskTracker;
