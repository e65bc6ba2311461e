use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::GeneratedCode;
use crate::config::Browser;
use crate::extract::{ExtractedProject, Framework};
use crate::stats::StatsSummary;
use crate::task::TaskHandle;

/// Where a code-generation job gets its project from.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectSource {
    /// Raw upload; the worker validates and extracts it.
    Archive {
        filename: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// Already extracted by the caller.
    Extracted {
        project: ExtractedProject,
        framework: Framework,
    },
}

impl fmt::Debug for ProjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectSource::Archive { filename, bytes } => f
                .debug_struct("Archive")
                .field("filename", filename)
                .field("bytes", &bytes.len())
                .finish(),
            ProjectSource::Extracted { project, framework } => f
                .debug_struct("Extracted")
                .field("files", &project.files.len())
                .field("framework", framework)
                .finish(),
        }
    }
}

/// Everything a worker needs to run one code-generation request. Stored
/// with the `PENDING` task so it survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeGenerationJob {
    pub user_id: i64,
    pub requirement: String,
    pub browser: Browser,
    pub source: ProjectSource,
}

/// A job paired with the task tracking it.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub handle: TaskHandle,
    pub job: CodeGenerationJob,
}

/// Outcome a worker reports back to the pool.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub handle: TaskHandle,
    pub success: bool,
    pub history_id: Option<i64>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(handle: TaskHandle, history_id: i64) -> Self {
        Self {
            handle,
            success: true,
            history_id: Some(history_id),
            error: None,
        }
    }

    pub fn failure(handle: TaskHandle, error: String) -> Self {
        Self {
            handle,
            success: false,
            history_id: None,
            error: Some(error),
        }
    }
}

/// Result bundle stored on a `SUCCESS` task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeGenerationResult {
    pub history_id: i64,
    pub framework: Framework,
    pub generated_code: GeneratedCode,
    pub integration_instructions: String,
    pub playwright_script: String,
    pub execution_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_stats: Option<StatsSummary>,
    pub test_stats_report: String,
    pub project_structure: Vec<String>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
