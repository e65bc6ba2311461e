use chrono::{Duration, Utc};

use super::error::TaskError;
use super::state::{TaskHandle, TaskState, TaskStatus};
use super::store::TaskStore;

/// Read-only view over the task store for pollers.
#[derive(Clone)]
pub struct TaskTracker {
    store: TaskStore,
    retention: Option<Duration>,
}

impl TaskTracker {
    pub fn new(store: TaskStore) -> Self {
        Self {
            store,
            retention: None,
        }
    }

    /// Finished tasks older than `retention` poll as `NotFound` even before
    /// the sweep removes them.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Single non-blocking lookup.
    pub fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus, TaskError> {
        let Some(record) = self.store.get(handle)? else {
            return Ok(TaskStatus::NotFound);
        };

        if let Some(retention) = self.retention {
            if record.state.is_terminal() && record.updated_at + retention < Utc::now() {
                return Ok(TaskStatus::NotFound);
            }
        }

        let status = match record.state {
            TaskState::Pending => TaskStatus::Pending {
                progress: record.progress,
                message: record.message,
            },
            TaskState::Progress => TaskStatus::Progress {
                progress: record.progress,
                message: record.message,
            },
            TaskState::Success => TaskStatus::Success {
                progress: record.progress,
                message: record.message,
                result: record.result.unwrap_or(serde_json::Value::Null),
            },
            TaskState::Failure => TaskStatus::Failure {
                progress: record.progress,
                message: record.message,
                error: record
                    .error
                    .unwrap_or_else(|| "Task failed without an error message".to_string()),
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn tracker() -> (TaskStore, TaskTracker) {
        let store = TaskStore::new(Database::open_in_memory().unwrap());
        (store.clone(), TaskTracker::new(store))
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        let (_, tracker) = tracker();
        assert_eq!(
            tracker.poll(&TaskHandle::from("does-not-exist")).unwrap(),
            TaskStatus::NotFound
        );
    }

    #[test]
    fn test_poll_follows_transitions() {
        let (store, tracker) = tracker();
        let handle = store.create(&"job").unwrap();

        assert_eq!(
            tracker.poll(&handle).unwrap(),
            TaskStatus::Pending {
                progress: 0,
                message: "Queued".into()
            }
        );

        store.mark_progress(&handle, 30, "Analyzing code and generating features...").unwrap();
        let status = tracker.poll(&handle).unwrap();
        assert_eq!(status.state(), Some(TaskState::Progress));
        assert_eq!(status.progress(), Some(30));

        store
            .mark_success(&handle, &serde_json::json!({"framework": "flask"}), "Complete!")
            .unwrap();
        match tracker.poll(&handle).unwrap() {
            TaskStatus::Success {
                progress, result, ..
            } => {
                assert_eq!(progress, 100);
                assert_eq!(result["framework"], "flask");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_carries_error() {
        let (store, tracker) = tracker();
        let handle = store.create(&"job").unwrap();
        store.mark_failure(&handle, "Archive contains no files").unwrap();

        match tracker.poll(&handle).unwrap() {
            TaskStatus::Failure { error, .. } => assert_eq!(error, "Archive contains no files"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_terminal_task_is_not_found() {
        let store = TaskStore::new(Database::open_in_memory().unwrap());
        let tracker = TaskTracker::new(store.clone()).with_retention(Duration::seconds(-1));

        let done = store.create(&"job").unwrap();
        let live = store.create(&"job").unwrap();
        store.mark_success(&done, &"ok", "Complete!").unwrap();

        assert_eq!(tracker.poll(&done).unwrap(), TaskStatus::NotFound);
        assert_eq!(tracker.poll(&live).unwrap().state(), Some(TaskState::Pending));
    }
}
