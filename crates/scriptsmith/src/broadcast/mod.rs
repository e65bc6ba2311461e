//! Broadcasting of live events to in-process subscribers.

pub mod task_progress;

pub use task_progress::{TaskProgressBroadcaster, TaskProgressEvent};
