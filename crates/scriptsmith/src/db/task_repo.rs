//! Task repository for the `tasks` and `task_owners` tables.
//!
//! State transitions are guarded in SQL: updates only apply to rows that
//! are still `PENDING` or `PROGRESS` and held by the writing owner, and
//! progress never moves backwards.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw task row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub task_id: String,
    pub state: String,
    pub progress: u8,
    pub message: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub payload: Option<String>,
    pub owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            state: row.get("state")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            result: row.get("result")?,
            error: row.get("error")?,
            payload: row.get("payload")?,
            owner: row.get("owner")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new task row.
pub fn insert(db: &Database, task: &TaskRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (task_id, state, progress, message, result, error, payload,
             owner, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.task_id,
                task.state,
                task.progress,
                task.message,
                task.result,
                task.error,
                task.payload,
                task.owner,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a task by id.
pub fn find_by_id(db: &Database, task_id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE task_id = ?1")?;
        let mut rows = stmt.query_map(params![task_id], TaskRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists live tasks that no running process holds, oldest first.
///
/// A task is orphaned when its owner is not `owner` and has no heartbeat at
/// or after `stale_before`.
pub fn find_orphaned(
    db: &Database,
    owner: &str,
    stale_before: &str,
) -> Result<Vec<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT t.* FROM tasks t
             LEFT JOIN task_owners o ON o.owner = t.owner
             WHERE t.state IN ('PENDING', 'PROGRESS')
               AND (t.owner IS NULL OR t.owner != ?1)
               AND (o.heartbeat_at IS NULL OR o.heartbeat_at < ?2)
             ORDER BY t.created_at, t.task_id",
        )?;
        let rows = stmt
            .query_map(params![owner, stale_before], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a live task from `previous` to `owner`.
///
/// Returns `false` when another process changed the owner first.
pub fn claim(
    db: &Database,
    task_id: &str,
    previous: Option<&str>,
    owner: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE tasks SET owner = ?3
             WHERE task_id = ?1 AND owner IS ?2 AND state IN ('PENDING', 'PROGRESS')",
            params![task_id, previous, owner],
        )?;
        Ok(affected > 0)
    })
}

/// Moves a live task to `PROGRESS`. A lower progress value than the stored
/// one leaves the stored value in place.
///
/// Returns `false` when the task is unknown, terminal or held by another owner.
pub fn update_progress(
    db: &Database,
    task_id: &str,
    owner: &str,
    progress: u8,
    message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE tasks SET state = 'PROGRESS', progress = MAX(progress, ?3),
             message = ?4, updated_at = ?5
             WHERE task_id = ?1 AND owner = ?2 AND state IN ('PENDING', 'PROGRESS')",
            params![task_id, owner, progress, message, updated_at],
        )?;
        Ok(affected > 0)
    })
}

/// True when the task is live and held by `owner`.
pub fn is_held_by(conn: &Connection, task_id: &str, owner: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM tasks
         WHERE task_id = ?1 AND owner = ?2 AND state IN ('PENDING', 'PROGRESS')",
        params![task_id, owner],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Marks a live task `SUCCESS` with its result and drops the queued payload.
pub fn mark_success(
    db: &Database,
    task_id: &str,
    owner: &str,
    result: &str,
    message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| mark_success_on(conn, task_id, owner, result, message, updated_at))
}

/// [`mark_success`] on a connection the caller already holds.
pub fn mark_success_on(
    conn: &Connection,
    task_id: &str,
    owner: &str,
    result: &str,
    message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE tasks SET state = 'SUCCESS', progress = 100, message = ?4,
         result = ?3, error = NULL, payload = NULL, updated_at = ?5
         WHERE task_id = ?1 AND owner = ?2 AND state IN ('PENDING', 'PROGRESS')",
        params![task_id, owner, result, message, updated_at],
    )?;
    Ok(affected > 0)
}

/// Marks a live task `FAILURE` with its error and drops the queued payload.
/// Progress stays where it was.
pub fn mark_failure(
    db: &Database,
    task_id: &str,
    owner: &str,
    error: &str,
    message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE tasks SET state = 'FAILURE', message = ?4, error = ?3,
             result = NULL, payload = NULL, updated_at = ?5
             WHERE task_id = ?1 AND owner = ?2 AND state IN ('PENDING', 'PROGRESS')",
            params![task_id, owner, error, message, updated_at],
        )?;
        Ok(affected > 0)
    })
}

/// Deletes terminal tasks last updated before `cutoff`. Returns the number removed.
pub fn delete_finished_before(db: &Database, cutoff: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM tasks WHERE state IN ('SUCCESS', 'FAILURE') AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(affected)
    })
}

/// Records that `owner` is alive at `at`.
pub fn touch_owner(db: &Database, owner: &str, at: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO task_owners (owner, heartbeat_at) VALUES (?1, ?2)
             ON CONFLICT(owner) DO UPDATE SET heartbeat_at = excluded.heartbeat_at",
            params![owner, at],
        )?;
        Ok(())
    })
}

/// Forgets an owner. Its live tasks become orphaned immediately.
pub fn remove_owner(db: &Database, owner: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM task_owners WHERE owner = ?1", params![owner])?;
        Ok(affected > 0)
    })
}

/// Deletes owners whose last heartbeat is before `stale_before`.
pub fn delete_stale_owners(db: &Database, stale_before: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM task_owners WHERE heartbeat_at < ?1",
            params![stale_before],
        )?;
        Ok(affected)
    })
}
