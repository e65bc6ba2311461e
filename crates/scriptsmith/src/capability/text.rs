use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::CapabilityError;
use crate::sanitize;

/// Opaque natural-language text generation.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, CapabilityError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpTextGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpTextGenerator {
    /// Builds the client; the API key is read from the configured environment variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CapabilityError::Generation(format!("failed to build HTTP client: {}", e)))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::warn!(
                "{} is not set; requests to {} are sent without credentials",
                config.api_key_env,
                sanitize::redact_endpoint(&config.endpoint)
            );
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    fn request_body<'a>(&'a self, system: &'a str, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        }
    }
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, CapabilityError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(system, prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| CapabilityError::Generation(e.to_string()))?
            .error_for_status()
            .map_err(|e| CapabilityError::Generation(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .map_err(|e| CapabilityError::MalformedResponse(e.to_string()))?;

        extract_content(body)
    }
}

fn extract_content(body: ChatResponse) -> Result<String, CapabilityError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(CapabilityError::EmptyResponse)
}
