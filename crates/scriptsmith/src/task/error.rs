use thiserror::Error;

use crate::db::DatabaseError;

/// Errors from the task store.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode task data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Task '{task_id}' has a corrupt record: {reason}")]
    Corrupt { task_id: String, reason: String },
}
