use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::extract::{ExtractedProject, Framework};

use super::prompts::{self, CODE_SYSTEM, INTEGRATION_SYSTEM};
use super::text::TextGenerator;

/// Kind of generated source fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Routes,
    Templates,
    Css,
    Js,
    Models,
    Forms,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 6] = [
        ArtifactCategory::Routes,
        ArtifactCategory::Templates,
        ArtifactCategory::Css,
        ArtifactCategory::Js,
        ArtifactCategory::Models,
        ArtifactCategory::Forms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Routes => "routes",
            ArtifactCategory::Templates => "templates",
            ArtifactCategory::Css => "css",
            ArtifactCategory::Js => "js",
            ArtifactCategory::Models => "models",
            ArtifactCategory::Forms => "forms",
        }
    }

    /// Key used for this category in the generator's JSON reply.
    pub fn reply_key(&self) -> &'static str {
        match self {
            ArtifactCategory::Routes => "routes_code",
            ArtifactCategory::Templates => "template_code",
            ArtifactCategory::Css => "css_code",
            ArtifactCategory::Js => "js_code",
            ArtifactCategory::Models => "models_code",
            ArtifactCategory::Forms => "forms_code",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated fragments keyed by category. Empty fragments are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedCode {
    artifacts: BTreeMap<ArtifactCategory, String>,
}

impl GeneratedCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: ArtifactCategory, content: impl Into<String>) {
        let content = content.into();
        if content.trim().is_empty() {
            self.artifacts.remove(&category);
        } else {
            self.artifacts.insert(category, content);
        }
    }

    pub fn with(mut self, category: ArtifactCategory, content: impl Into<String>) -> Self {
        self.insert(category, content);
        self
    }

    pub fn get(&self, category: ArtifactCategory) -> Option<&str> {
        self.artifacts.get(&category).map(String::as_str)
    }

    pub fn categories(&self) -> impl Iterator<Item = ArtifactCategory> + '_ {
        self.artifacts.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Labelled plain-text rendering used in prompts and history.
    pub fn render(&self) -> String {
        self.artifacts
            .iter()
            .map(|(category, content)| format!("=== {} ===\n{}", category, content.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Parses the generator's JSON reply. Unknown keys are ignored.
    pub fn from_reply(response: &str) -> Result<Self, CapabilityError> {
        let json = prompts::extract_json_object(response).ok_or_else(|| {
            CapabilityError::MalformedResponse("code generator reply contains no JSON object".to_string())
        })?;

        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| CapabilityError::MalformedResponse(format!("invalid code JSON: {}", e)))?;

        let mut code = GeneratedCode::new();
        for category in ArtifactCategory::ALL {
            if let Some(serde_json::Value::String(content)) = raw.get(category.reply_key()) {
                code.insert(category, prompts::strip_code_fences(content));
            }
        }

        if code.is_empty() {
            return Err(CapabilityError::MalformedResponse(
                "code generator reply contains no code".to_string(),
            ));
        }
        Ok(code)
    }
}

/// Produces new source fragments for a requirement against a project.
pub trait CodeGenerator: Send + Sync {
    fn generate_code(
        &self,
        requirement: &str,
        project: &ExtractedProject,
        framework: Framework,
    ) -> Result<GeneratedCode, CapabilityError>;
}

/// Produces merge instructions for generated fragments.
pub trait IntegrationGuideGenerator: Send + Sync {
    fn integration_guide(
        &self,
        requirement: &str,
        code: &GeneratedCode,
        framework: Framework,
    ) -> Result<String, CapabilityError>;
}

pub struct LlmCodeGenerator {
    text: Arc<dyn TextGenerator>,
}

impl LlmCodeGenerator {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }
}

impl CodeGenerator for LlmCodeGenerator {
    fn generate_code(
        &self,
        requirement: &str,
        project: &ExtractedProject,
        framework: Framework,
    ) -> Result<GeneratedCode, CapabilityError> {
        let prompt = prompts::code_prompt(requirement, project, framework);
        let response = self.text.generate(CODE_SYSTEM, &prompt)?;
        GeneratedCode::from_reply(&response)
    }
}

pub struct LlmIntegrationGuide {
    text: Arc<dyn TextGenerator>,
}

impl LlmIntegrationGuide {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }
}

impl IntegrationGuideGenerator for LlmIntegrationGuide {
    fn integration_guide(
        &self,
        requirement: &str,
        code: &GeneratedCode,
        framework: Framework,
    ) -> Result<String, CapabilityError> {
        let prompt = prompts::integration_prompt(requirement, code, framework);
        let guide = self.text.generate(INTEGRATION_SYSTEM, &prompt)?;
        let guide = guide.trim();
        if guide.is_empty() {
            return Err(CapabilityError::EmptyResponse);
        }
        Ok(guide.to_string())
    }
}
