use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{LlmProvider, LlmSettings};

/// Sampling temperature for every call the agent makes.
pub const TEMPERATURE: f32 = 0.0;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One single-turn, deterministic completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Builds the HTTP adapter matching `settings.provider`.
pub fn from_settings(settings: &LlmSettings) -> Box<dyn LanguageModel> {
    match settings.provider {
        LlmProvider::OpenAi => Box::new(OpenAiClient::new(
            settings.api_key.clone(),
            settings.base_url.clone(),
        )),
        LlmProvider::Anthropic => Box::new(AnthropicClient::new(
            settings.api_key.clone(),
            settings.base_url.clone(),
        )),
    }
}

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": request.model,
                "messages": [{"role": "user", "content": request.prompt}],
                "max_tokens": request.max_tokens,
                "temperature": TEMPERATURE,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = api_error_message(&body);
            warn!(%status, %message, "OpenAI API error");
            return Err(anyhow!("OpenAI API error ({}): {}", status, message));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in LLM response: {}", body))?;

        debug!(model = %request.model, chars = content.len(), "LLM replied");
        Ok(content.to_string())
    }
}

/// Anthropic messages endpoint.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "temperature": TEMPERATURE,
                "messages": [{"role": "user", "content": request.prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = api_error_message(&body);
            warn!(%status, %message, "Anthropic API error");
            return Err(anyhow!("Anthropic API error ({}): {}", status, message));
        }

        let text = anthropic_text(&body)
            .ok_or_else(|| anyhow!("No text content in LLM response: {}", body))?;

        debug!(model = %request.model, chars = text.len(), "LLM replied");
        Ok(text)
    }
}

fn api_error_message(body: &Value) -> String {
    body["error"]["message"]
        .as_str()
        .unwrap_or("Unknown API error")
        .to_string()
}

/// Concatenates the `text` blocks of a messages response.
fn anthropic_text(body: &Value) -> Option<String> {
    let blocks = body["content"].as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}
