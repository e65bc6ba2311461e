use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskState::Pending),
            "PROGRESS" => Some(TaskState::Progress),
            "SUCCESS" => Some(TaskState::Success),
            "FAILURE" => Some(TaskState::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier returned by `enqueue` and accepted by `poll`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Generates a fresh random handle.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a poller sees for a handle.
///
/// The result payload only exists on `Success` and the error only on
/// `Failure`. Unknown and expired handles are `NotFound`, never `Pending`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending {
        progress: u8,
        message: String,
    },
    Progress {
        progress: u8,
        message: String,
    },
    Success {
        progress: u8,
        message: String,
        result: serde_json::Value,
    },
    Failure {
        progress: u8,
        message: String,
        error: String,
    },
    NotFound,
}

impl TaskStatus {
    /// `None` for `NotFound`.
    pub fn state(&self) -> Option<TaskState> {
        match self {
            TaskStatus::Pending { .. } => Some(TaskState::Pending),
            TaskStatus::Progress { .. } => Some(TaskState::Progress),
            TaskStatus::Success { .. } => Some(TaskState::Success),
            TaskStatus::Failure { .. } => Some(TaskState::Failure),
            TaskStatus::NotFound => None,
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            TaskStatus::Pending { progress, .. }
            | TaskStatus::Progress { progress, .. }
            | TaskStatus::Success { progress, .. }
            | TaskStatus::Failure { progress, .. } => Some(*progress),
            TaskStatus::NotFound => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TaskStatus::Pending { message, .. }
            | TaskStatus::Progress { message, .. }
            | TaskStatus::Success { message, .. }
            | TaskStatus::Failure { message, .. } => Some(message),
            TaskStatus::NotFound => None,
        }
    }

    /// True once polling can stop.
    pub fn is_settled(&self) -> bool {
        match self.state() {
            Some(state) => state.is_terminal(),
            None => true,
        }
    }
}
