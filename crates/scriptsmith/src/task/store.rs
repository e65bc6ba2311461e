//! Durable task store backed by the `tasks` table.
//!
//! The worker drives every transition through this type. Each transition is
//! a single guarded UPDATE so concurrent workers never see a torn record,
//! and each one is mirrored on the optional progress broadcaster.
//!
//! Every store carries an owner id. Tasks are written only by the store that
//! holds them, and a process keeps its claim alive with [`TaskStore::heartbeat`].
//! [`TaskStore::recover`] takes over only tasks whose owner stopped beating.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::TaskError;
use super::state::{TaskHandle, TaskState};
use crate::broadcast::{TaskProgressBroadcaster, TaskProgressEvent};
use crate::db::task_repo::{self, TaskRow};
use crate::db::{self, Database};

/// Message stored on a freshly queued task.
pub const QUEUED_MESSAGE: &str = "Queued";
/// Message stored on a task interrupted by a process restart.
pub const INTERRUPTED_ERROR: &str = "Task was interrupted before completion";
/// How often a running process refreshes its claim on its tasks.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Seconds without a heartbeat after which an owner's tasks are orphaned.
pub const OWNER_TIMEOUT_SECS: i64 = 30;

/// Typed view of one task row.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub handle: TaskHandle,
    pub state: TaskState,
    pub progress: u8,
    pub message: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    fn from_row(row: TaskRow) -> Result<Self, TaskError> {
        let corrupt = |reason: String| TaskError::Corrupt {
            task_id: row.task_id.clone(),
            reason,
        };

        let state = TaskState::parse(&row.state)
            .ok_or_else(|| corrupt(format!("unknown state '{}'", row.state)))?;
        let result = match &row.result {
            Some(raw) => Some(
                serde_json::from_str(raw).map_err(|e| corrupt(format!("result: {}", e)))?,
            ),
            None => None,
        };
        let created_at = parse_timestamp(&row.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&row.updated_at).map_err(&corrupt)?;

        Ok(Self {
            handle: TaskHandle::from(row.task_id),
            state,
            progress: row.progress.min(100),
            message: row.message,
            result,
            error: row.error,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{}': {}", s, e))
}

/// A queued job read back from the store after a restart.
#[derive(Debug)]
pub struct RecoveredTask<T> {
    pub handle: TaskHandle,
    pub payload: T,
}

/// Persistent status store keyed by [`TaskHandle`].
///
/// Clones share one owner id.
#[derive(Clone)]
pub struct TaskStore {
    db: Database,
    owner: String,
    broadcaster: Option<TaskProgressBroadcaster>,
}

impl TaskStore {
    /// A store with a fresh owner id.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            owner: uuid::Uuid::new_v4().to_string(),
            broadcaster: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Publishes every transition on `broadcaster` as well.
    pub fn with_broadcaster(mut self, broadcaster: TaskProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Writes a new `PENDING` task carrying the serialized job payload.
    pub fn create<P: Serialize>(&self, payload: &P) -> Result<TaskHandle, TaskError> {
        let handle = TaskHandle::generate();
        let payload = serde_json::to_string(payload).map_err(TaskError::Encode)?;
        let now = db::now_rfc3339();

        task_repo::insert(
            &self.db,
            &TaskRow {
                task_id: handle.to_string(),
                state: TaskState::Pending.as_str().to_string(),
                progress: 0,
                message: QUEUED_MESSAGE.to_string(),
                result: None,
                error: None,
                payload: Some(payload),
                owner: Some(self.owner.clone()),
                created_at: now.clone(),
                updated_at: now,
            },
        )?;

        log::debug!("Task {} queued", handle);
        self.publish(TaskProgressEvent::new(
            &handle,
            TaskState::Pending,
            0,
            QUEUED_MESSAGE,
        ));
        Ok(handle)
    }

    /// Records a progress checkpoint. Values above 100 are clamped and a
    /// value below the stored progress never lowers it.
    ///
    /// Returns `false` when the task is unknown, already finished or held by
    /// another store.
    pub fn mark_progress(
        &self,
        handle: &TaskHandle,
        progress: u8,
        message: &str,
    ) -> Result<bool, TaskError> {
        let progress = progress.min(100);
        let applied = task_repo::update_progress(
            &self.db,
            handle.as_str(),
            &self.owner,
            progress,
            message,
            &db::now_rfc3339(),
        )?;

        if applied {
            let stored = self.get(handle)?.map(|r| r.progress).unwrap_or(progress);
            self.publish(TaskProgressEvent::new(
                handle,
                TaskState::Progress,
                stored,
                message,
            ));
        } else {
            log::warn!("Ignoring progress {} for settled or unknown task {}", progress, handle);
        }
        Ok(applied)
    }

    /// Completes a task with its result bundle.
    pub fn mark_success<R: Serialize>(
        &self,
        handle: &TaskHandle,
        result: &R,
        message: &str,
    ) -> Result<bool, TaskError> {
        let result = serde_json::to_string(result).map_err(TaskError::Encode)?;
        let applied = task_repo::mark_success(
            &self.db,
            handle.as_str(),
            &self.owner,
            &result,
            message,
            &db::now_rfc3339(),
        )?;

        if applied {
            self.publish_success(handle, message);
        }
        Ok(applied)
    }

    /// Completes a task together with the rows `settle` writes, in one
    /// transaction.
    ///
    /// `settle` runs only while the task is still live and held by this
    /// store, and its writes are rolled back unless the task flips to
    /// `SUCCESS` with the value it returns. Returns `None` when the task was
    /// already finished, unknown or taken over.
    pub fn complete_with<R, F>(
        &self,
        handle: &TaskHandle,
        message: &str,
        settle: F,
    ) -> Result<Option<R>, TaskError>
    where
        R: Serialize,
        F: FnOnce(&Connection) -> Result<R, TaskError>,
    {
        let completed = self.db.with_transaction(|conn| {
            if !task_repo::is_held_by(conn, handle.as_str(), &self.owner)? {
                return Ok(None);
            }
            let result = settle(conn)?;
            let encoded = serde_json::to_string(&result).map_err(TaskError::Encode)?;
            task_repo::mark_success_on(
                conn,
                handle.as_str(),
                &self.owner,
                &encoded,
                message,
                &db::now_rfc3339(),
            )?;
            Ok::<_, TaskError>(Some(result))
        })?;

        match &completed {
            Some(_) => self.publish_success(handle, message),
            None => log::warn!("Task {} was no longer held at completion", handle),
        }
        Ok(completed)
    }

    /// Fails a task from any non-terminal state.
    pub fn mark_failure(&self, handle: &TaskHandle, error: &str) -> Result<bool, TaskError> {
        let applied = task_repo::mark_failure(
            &self.db,
            handle.as_str(),
            &self.owner,
            error,
            "Failed",
            &db::now_rfc3339(),
        )?;

        if applied {
            let progress = self.get(handle)?.map(|r| r.progress).unwrap_or(0);
            self.publish(TaskProgressEvent::failed(handle, progress, error));
        }
        Ok(applied)
    }

    /// Loads a task, or `None` when the handle is unknown.
    pub fn get(&self, handle: &TaskHandle) -> Result<Option<TaskRecord>, TaskError> {
        task_repo::find_by_id(&self.db, handle.as_str())?
            .map(TaskRecord::from_row)
            .transpose()
    }

    /// Removes finished tasks last updated before `cutoff`.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, TaskError> {
        let removed = task_repo::delete_finished_before(&self.db, &db::format_timestamp(cutoff))?;
        if removed > 0 {
            log::info!("Purged {} finished task(s)", removed);
        }
        Ok(removed)
    }

    /// Records that this store's process is alive.
    pub fn heartbeat(&self) -> Result<(), TaskError> {
        task_repo::touch_owner(&self.db, &self.owner, &db::now_rfc3339())?;
        Ok(())
    }

    /// Drops this store's heartbeat so another process can take over any
    /// task it still holds.
    pub fn release(&self) -> Result<(), TaskError> {
        task_repo::remove_owner(&self.db, &self.owner)?;
        Ok(())
    }

    /// Takes over work left behind by processes that stopped.
    ///
    /// Only tasks whose owner has no heartbeat within [`OWNER_TIMEOUT_SECS`]
    /// are touched, so tasks of a live process are never disturbed. Claimed
    /// `PENDING` tasks are returned with their decoded payload so they can be
    /// queued again. Claimed `PROGRESS` tasks were cut off mid-run and are
    /// failed, as are `PENDING` tasks whose payload no longer decodes.
    pub fn recover<P: DeserializeOwned>(&self) -> Result<Vec<RecoveredTask<P>>, TaskError> {
        self.heartbeat()?;
        let stale_before =
            db::format_timestamp(Utc::now() - chrono::Duration::seconds(OWNER_TIMEOUT_SECS));

        let mut recovered = Vec::new();
        for row in task_repo::find_orphaned(&self.db, &self.owner, &stale_before)? {
            if !task_repo::claim(&self.db, &row.task_id, row.owner.as_deref(), &self.owner)? {
                log::debug!("Task {} was claimed by another process", row.task_id);
                continue;
            }
            let handle = TaskHandle::from(row.task_id);

            if row.state == TaskState::Progress.as_str() {
                log::warn!("Task {} was interrupted, marking as failed", handle);
                self.mark_failure(&handle, INTERRUPTED_ERROR)?;
                continue;
            }

            let decoded = row
                .payload
                .as_deref()
                .ok_or_else(|| "missing payload".to_string())
                .and_then(|raw| serde_json::from_str::<P>(raw).map_err(|e| e.to_string()));

            match decoded {
                Ok(payload) => recovered.push(RecoveredTask { handle, payload }),
                Err(reason) => {
                    log::warn!("Dropping queued task {}: {}", handle, reason);
                    self.mark_failure(&handle, &format!("Queued job could not be restored: {}", reason))?;
                }
            }
        }

        let stale = task_repo::delete_stale_owners(&self.db, &stale_before)?;
        if stale > 0 {
            log::debug!("Forgot {} stale task owner(s)", stale);
        }
        if !recovered.is_empty() {
            log::info!("Recovered {} queued task(s)", recovered.len());
        }
        Ok(recovered)
    }

    fn publish_success(&self, handle: &TaskHandle, message: &str) {
        self.publish(TaskProgressEvent::new(
            handle,
            TaskState::Success,
            100,
            message,
        ));
    }

    fn publish(&self, event: TaskProgressEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(event);
        }
    }
}
