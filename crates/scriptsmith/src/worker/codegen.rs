//! Runs one queued code-generation job end to end.

use tracing::{info, info_span, warn};

use crate::capability::Capabilities;
use crate::error::{Result, ScriptsmithError};
use crate::extract::{detect_framework, ArchiveExtractor};
use crate::graph::{Graph, GenerationState, GraphEvent, GraphVariant, NodeId, ProgressReporter};
use crate::history;
use crate::task::{TaskHandle, TaskStore};

use super::job::{CodeGenerationResult, ProjectSource, QueuedJob};

/// Progress checkpoint: project extraction.
pub const CHECKPOINT_EXTRACT: (u8, &str) = (10, "Extracting project files...");
/// Progress checkpoint: code generation and analysis underway.
pub const CHECKPOINT_GENERATE: (u8, &str) = (30, "Analyzing code and generating features...");
/// Progress checkpoint: verification script running.
pub const CHECKPOINT_VERIFY: (u8, &str) = (80, "Running tests...");
/// Message stored with the final 100% checkpoint.
pub const COMPLETE_MESSAGE: &str = "Complete!";

/// Maps graph node starts onto task checkpoints.
struct TaskCheckpoints<'a> {
    store: &'a TaskStore,
    handle: &'a TaskHandle,
}

impl TaskCheckpoints<'_> {
    fn checkpoint(&self, (progress, message): (u8, &str)) {
        if let Err(e) = self.store.mark_progress(self.handle, progress, message) {
            warn!(task = %self.handle, error = %e, "Failed to record checkpoint");
        }
    }
}

impl ProgressReporter for TaskCheckpoints<'_> {
    fn report(&self, event: GraphEvent) {
        match event {
            GraphEvent::NodeStarted {
                node: NodeId::CodeGenerator,
            } => self.checkpoint(CHECKPOINT_GENERATE),
            GraphEvent::NodeStarted {
                node: NodeId::Execute,
            } => self.checkpoint(CHECKPOINT_VERIFY),
            _ => {}
        }
    }
}

/// Extracts the project, walks the code-generation graph, saves history and
/// settles the task.
pub struct CodeGenerationRunner {
    graph: Graph,
    extractor: ArchiveExtractor,
    store: TaskStore,
}

impl CodeGenerationRunner {
    pub fn new(capabilities: Capabilities, extractor: ArchiveExtractor, store: TaskStore) -> Self {
        Self {
            graph: Graph::new(capabilities),
            extractor,
            store,
        }
    }

    /// The store every job of this runner settles through.
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Runs the job. On error the task is marked `FAILURE` and the error is
    /// still returned to the caller.
    pub fn run(&self, queued: &QueuedJob) -> Result<CodeGenerationResult> {
        let _span = info_span!("codegen_job", task = %queued.handle).entered();

        match self.try_run(queued) {
            Ok(result) => {
                info!(history_id = result.history_id, "Code generation complete");
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Code generation failed");
                if let Err(store_err) = self.store.mark_failure(&queued.handle, &e.to_string()) {
                    tracing::error!(error = %store_err, "Failed to record task failure");
                }
                Err(e)
            }
        }
    }

    fn try_run(&self, queued: &QueuedJob) -> Result<CodeGenerationResult> {
        let handle = &queued.handle;
        let job = &queued.job;
        let checkpoints = TaskCheckpoints {
            store: &self.store,
            handle,
        };

        checkpoints.checkpoint(CHECKPOINT_EXTRACT);
        let (project, framework) = match &job.source {
            ProjectSource::Archive { filename, bytes } => {
                let project = self.extractor.extract(filename, bytes)?;
                let framework = detect_framework(&project);
                (project, framework)
            }
            ProjectSource::Extracted { project, framework } => (project.clone(), *framework),
        };
        info!(
            files = project.files.len(),
            framework = framework.as_str(),
            "Project ready"
        );

        let state = GenerationState::new(job.requirement.clone(), job.browser)
            .with_project(project, framework);
        let run = self
            .graph
            .run(GraphVariant::CodeGeneration, state, &checkpoints)?;

        // History row and SUCCESS commit together, and only while this
        // process still holds the task.
        let completed = self.store.complete_with(handle, COMPLETE_MESSAGE, |conn| {
            let record = history::record_code_generation(conn, job.user_id, &run.state)?;
            let state = run.state;
            Ok(CodeGenerationResult {
                history_id: record.id,
                framework,
                generated_code: state.generated_code.unwrap_or_default(),
                integration_instructions: state.integration_instructions.unwrap_or_default(),
                playwright_script: state.playwright_script.unwrap_or_default(),
                execution_result: state.execution_result.unwrap_or_default(),
                test_stats: state.test_stats,
                test_stats_report: state.test_stats_report.unwrap_or_default(),
                project_structure: state
                    .extracted_code
                    .map(|p| p.project_structure)
                    .unwrap_or_default(),
            })
        })?;

        let result = completed.ok_or_else(|| {
            ScriptsmithError::NotFound(format!(
                "task {} was settled or taken over before completion",
                handle
            ))
        })?;
        Ok(result)
    }
}
