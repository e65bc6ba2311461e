//! Task progress broadcaster for live task status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::task::{TaskHandle, TaskState};

/// A single task transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressEvent {
    /// Task the event belongs to.
    pub task_id: TaskHandle,
    /// State after the transition.
    pub state: TaskState,
    /// Progress after the transition, 0 to 100.
    pub progress: u8,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskProgressEvent {
    /// Creates a non-failure event.
    pub fn new(task_id: &TaskHandle, state: TaskState, progress: u8, message: &str) -> Self {
        Self {
            task_id: task_id.clone(),
            state,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Creates a failure event.
    pub fn failed(task_id: &TaskHandle, progress: u8, error: &str) -> Self {
        Self {
            task_id: task_id.clone(),
            state: TaskState::Failure,
            progress,
            message: "Failed".to_string(),
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

/// Broadcasts task progress events to any number of subscribers.
#[derive(Clone)]
pub struct TaskProgressBroadcaster {
    sender: Arc<broadcast::Sender<TaskProgressEvent>>,
}

impl TaskProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: TaskProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for TaskProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = TaskProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        let handle = TaskHandle::from("task-1");

        broadcaster.send(TaskProgressEvent::new(
            &handle,
            TaskState::Progress,
            30,
            "Analyzing code and generating features...",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.task_id, handle);
        assert_eq!(received.state, TaskState::Progress);
        assert_eq!(received.progress, 30);
        assert!(received.error.is_none());
    }

    #[test]
    fn test_failed_event() {
        let broadcaster = TaskProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.send(TaskProgressEvent::failed(
            &TaskHandle::from("task-2"),
            10,
            "archive contains a path traversal entry",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.state, TaskState::Failure);
        assert_eq!(received.progress, 10);
        assert_eq!(
            received.error.as_deref(),
            Some("archive contains a path traversal entry")
        );
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = TaskProgressBroadcaster::new(4);
        broadcaster.send(TaskProgressEvent::new(
            &TaskHandle::from("task-3"),
            TaskState::Pending,
            0,
            "Queued",
        ));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = TaskProgressEvent::new(&TaskHandle::from("t"), TaskState::Success, 100, "Complete!");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["taskId"], "t");
        assert_eq!(json["state"], "SUCCESS");
        assert!(json.get("error").is_none());
    }
}
