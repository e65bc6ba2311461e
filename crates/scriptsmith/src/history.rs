//! History records: one immutable row per finished generation run.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::history_repo::{self, HistoryRow, NewHistory, KIND_CODE_GENERATION, KIND_TEST_GENERATION};
use crate::db::{self, Database, DatabaseError};
use crate::graph::GenerationState;

/// Prefix stored in front of code-generation requirements.
pub const CODE_GEN_PREFIX: &str = "[CODE GEN] ";

/// Which graph produced a record.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    TestGeneration,
    CodeGeneration,
}

impl RunKind {
    fn as_str(&self) -> &'static str {
        match self {
            RunKind::TestGeneration => KIND_TEST_GENERATION,
            RunKind::CodeGeneration => KIND_CODE_GENERATION,
        }
    }

    fn parse(s: &str) -> Self {
        if s == KIND_CODE_GENERATION {
            RunKind::CodeGeneration
        } else {
            RunKind::TestGeneration
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub requirement: String,
    pub script: String,
    pub result: String,
    pub timestamp: DateTime<Utc>,
    pub kind: RunKind,
}

impl HistoryRecord {
    fn from_row(row: HistoryRow) -> Result<Self, DatabaseError> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DatabaseError::Corrupt {
                table: "history",
                id: row.id.to_string(),
                reason: format!("timestamp '{}': {}", row.timestamp, e),
            })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            requirement: row.requirement,
            script: row.script,
            result: row.result,
            timestamp,
            kind: RunKind::parse(&row.kind),
        })
    }

    /// The requirement without the code-generation prefix.
    pub fn bare_requirement(&self) -> &str {
        self.requirement
            .strip_prefix(CODE_GEN_PREFIX)
            .unwrap_or(&self.requirement)
    }
}

/// Transcript stored for a test-generation run.
pub fn compose_test_result(state: &GenerationState) -> String {
    let mut result = state.execution_result.clone().unwrap_or_default();
    if let Some(analysis) = state.analysis.as_deref().filter(|a| !a.is_empty()) {
        let _ = write!(result, "\n\nAnalysis:\n{}", analysis);
    }
    if let Some(report) = state.test_stats_report.as_deref().filter(|r| !r.is_empty()) {
        let _ = write!(result, "\n\nStats:\n{}", report);
    }
    result
}

/// Labelled transcript stored for a code-generation run.
pub fn compose_code_result(state: &GenerationState) -> String {
    let code = state
        .generated_code
        .as_ref()
        .map(|c| c.render())
        .unwrap_or_default();
    let mut result = format!(
        "Generated Code:\n{}\n\nIntegration Instructions:\n{}\n\nTest Script:\n{}\n\nExecution Result:\n{}",
        code,
        state.integration_instructions.as_deref().unwrap_or_default(),
        state.playwright_script.as_deref().unwrap_or("N/A"),
        state.execution_result.as_deref().unwrap_or("No result."),
    );
    if let Some(report) = state.test_stats_report.as_deref().filter(|r| !r.is_empty()) {
        let _ = write!(result, "\n\nStats:\n{}", report);
    }
    result
}

/// Persists a finished test-generation run.
pub fn record_test_generation(
    db: &Database,
    user_id: i64,
    state: &GenerationState,
) -> Result<HistoryRecord, DatabaseError> {
    let result = compose_test_result(state);
    db.with_conn(|conn| {
        insert(
            conn,
            user_id,
            &state.requirement,
            state.playwright_script.as_deref().unwrap_or_default(),
            &result,
            RunKind::TestGeneration,
        )
    })
}

/// Persists a finished code-generation run on `conn`. The worker calls this
/// inside the transaction that settles the task.
pub fn record_code_generation(
    conn: &Connection,
    user_id: i64,
    state: &GenerationState,
) -> Result<HistoryRecord, DatabaseError> {
    let requirement = format!("{}{}", CODE_GEN_PREFIX, state.requirement);
    let script = state
        .generated_code
        .as_ref()
        .map(|c| c.render())
        .unwrap_or_default();
    let result = compose_code_result(state);
    insert(conn, user_id, &requirement, &script, &result, RunKind::CodeGeneration)
}

fn insert(
    conn: &Connection,
    user_id: i64,
    requirement: &str,
    script: &str,
    result: &str,
    kind: RunKind,
) -> Result<HistoryRecord, DatabaseError> {
    let now = Utc::now();
    let timestamp = db::format_timestamp(now);
    let id = history_repo::insert_on(
        conn,
        &NewHistory {
            user_id,
            requirement,
            script,
            result,
            timestamp: &timestamp,
            kind: kind.as_str(),
        },
    )?;

    log::info!("Saved history record {} ({})", id, kind.as_str());
    Ok(HistoryRecord {
        id,
        user_id,
        requirement: requirement.to_string(),
        script: script.to_string(),
        result: result.to_string(),
        timestamp: now,
        kind,
    })
}

pub fn find(db: &Database, id: i64) -> Result<Option<HistoryRecord>, DatabaseError> {
    history_repo::find_by_id(db, id)?
        .map(HistoryRecord::from_row)
        .transpose()
}

/// Newest first.
pub fn search(db: &Database, query: &str, limit: u64) -> Result<Vec<HistoryRecord>, DatabaseError> {
    history_repo::search(db, query, limit)?
        .into_iter()
        .map(HistoryRecord::from_row)
        .collect()
}
