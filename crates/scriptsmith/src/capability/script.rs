use std::sync::Arc;

use crate::config::Browser;
use crate::error::CapabilityError;
use crate::extract::ExtractedProject;

use super::code::GeneratedCode;
use super::prompts::{self, DEBUG_SYSTEM, SCRIPT_SYSTEM};
use super::text::TextGenerator;

/// Inputs for one script generation call.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
    pub requirement: &'a str,
    pub browser: Browser,
    pub project: Option<&'a ExtractedProject>,
    pub generated_code: Option<&'a GeneratedCode>,
}

impl<'a> ScriptRequest<'a> {
    pub fn new(requirement: &'a str, browser: Browser) -> Self {
        Self {
            requirement,
            browser,
            project: None,
            generated_code: None,
        }
    }
}

/// Produces an executable automation script for a requirement.
pub trait ScriptGenerator: Send + Sync {
    fn generate_script(&self, request: &ScriptRequest<'_>) -> Result<String, CapabilityError>;
}

/// A revised script and the explanation of what was wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugResult {
    pub script: String,
    pub analysis: String,
}

/// Inputs for one debugging call.
#[derive(Debug, Clone, Copy)]
pub struct DebugRequest<'a> {
    pub requirement: &'a str,
    pub script: &'a str,
    pub transcript: &'a str,
    pub reason: &'a str,
}

/// Revises a script that failed.
pub trait ScriptDebugger: Send + Sync {
    fn debug_script(&self, request: &DebugRequest<'_>) -> Result<DebugResult, CapabilityError>;
}

/// [`ScriptGenerator`] backed by a text generator.
pub struct LlmScriptGenerator {
    text: Arc<dyn TextGenerator>,
}

impl LlmScriptGenerator {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }
}

impl ScriptGenerator for LlmScriptGenerator {
    fn generate_script(&self, request: &ScriptRequest<'_>) -> Result<String, CapabilityError> {
        let prompt = prompts::script_prompt(
            request.requirement,
            request.browser,
            request.project,
            request.generated_code,
        );
        let response = self.text.generate(SCRIPT_SYSTEM, &prompt)?;

        let script = prompts::strip_code_fences(&response);
        if script.is_empty() {
            return Err(CapabilityError::EmptyResponse);
        }
        Ok(script)
    }
}

/// [`ScriptDebugger`] backed by a text generator.
pub struct LlmScriptDebugger {
    text: Arc<dyn TextGenerator>,
}

impl LlmScriptDebugger {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }
}

impl ScriptDebugger for LlmScriptDebugger {
    fn debug_script(&self, request: &DebugRequest<'_>) -> Result<DebugResult, CapabilityError> {
        let prompt = prompts::debug_prompt(
            request.requirement,
            request.script,
            request.transcript,
            request.reason,
        );
        let response = self.text.generate(DEBUG_SYSTEM, &prompt)?;
        parse_debug_response(&response)
    }
}

/// Splits a debugger reply into its analysis prose and the fenced script.
fn parse_debug_response(response: &str) -> Result<DebugResult, CapabilityError> {
    let Some(fence) = response.find("```") else {
        return Err(CapabilityError::MalformedResponse(
            "debugger reply contains no code block".to_string(),
        ));
    };

    let script = prompts::strip_code_fences(&response[fence..]);
    if script.is_empty() || script.starts_with("```") {
        return Err(CapabilityError::MalformedResponse(
            "debugger reply contains an empty or unterminated code block".to_string(),
        ));
    }

    let prose = response[..fence].trim();
    let analysis = prose
        .strip_prefix("ANALYSIS:")
        .map(str::trim)
        .unwrap_or(prose);
    let analysis = if analysis.is_empty() {
        "The script was revised without an explanation.".to_string()
    } else {
        analysis.to_string()
    };

    Ok(DebugResult { script, analysis })
}
