//! External capabilities the graph nodes call: text generation and script execution.

pub mod code;
pub mod executor;
pub mod prompts;
pub mod script;
pub mod text;

use std::sync::Arc;

pub use code::{
    ArtifactCategory, CodeGenerator, GeneratedCode, IntegrationGuideGenerator, LlmCodeGenerator,
    LlmIntegrationGuide,
};
pub use executor::{
    ExecutionOutcome, ExecutionReport, ProcessScriptExecutor, ScriptExecutor, BROWSER_ENV,
    HEADLESS_ENV,
};
pub use script::{
    DebugRequest, DebugResult, LlmScriptDebugger, LlmScriptGenerator, ScriptDebugger,
    ScriptGenerator, ScriptRequest,
};
pub use text::{HttpTextGenerator, TextGenerator};

use crate::config::Config;
use crate::error::CapabilityError;

/// The set of capabilities one graph run may call.
#[derive(Clone)]
pub struct Capabilities {
    pub script_generator: Arc<dyn ScriptGenerator>,
    pub debugger: Arc<dyn ScriptDebugger>,
    pub executor: Arc<dyn ScriptExecutor>,
    pub code_generator: Arc<dyn CodeGenerator>,
    pub integration_guide: Arc<dyn IntegrationGuideGenerator>,
}

impl Capabilities {
    /// Production wiring: an HTTP text generator behind every prompt-driven
    /// capability and a child-process executor.
    pub fn from_config(config: &Config) -> Result<Self, CapabilityError> {
        let text: Arc<dyn TextGenerator> = Arc::new(HttpTextGenerator::from_config(&config.generation)?);
        Ok(Self::with_text_generator(text, Arc::new(ProcessScriptExecutor::new(&config.executor))))
    }

    pub fn with_text_generator(text: Arc<dyn TextGenerator>, executor: Arc<dyn ScriptExecutor>) -> Self {
        Self {
            script_generator: Arc::new(LlmScriptGenerator::new(Arc::clone(&text))),
            debugger: Arc::new(LlmScriptDebugger::new(Arc::clone(&text))),
            executor,
            code_generator: Arc::new(LlmCodeGenerator::new(Arc::clone(&text))),
            integration_guide: Arc::new(LlmIntegrationGuide::new(text)),
        }
    }
}
