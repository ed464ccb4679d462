//! Chat-completion clients.
//!
//! Two hosted APIs are supported, selected by `llm.provider`:
//!
//! | Config Value | API |
//! |--------------|-----|
//! | `"gemini"` | Google Generative Language `models/{model}:generateContent` |
//! | `"openai"` | OpenAI-compatible `POST /chat/completions` |
//!
//! Calls are made exactly once. A transport error, a non-2xx status, or a
//! response without text is returned to the caller as [`QaError::Llm`];
//! there is no retry. A missing API key is only detected when a call is
//! attempted and surfaces as [`QaError::Config`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::QaError;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Sends `prompt` as a single user message and returns the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, QaError>;
}

/// Connection settings shared by both providers.
struct Endpoint {
    model: String,
    temperature: f32,
    base_url: String,
    api_key_var: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl Endpoint {
    fn new(config: &LlmConfig, default_base: &str) -> Result<Self, QaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model_name().to_string(),
            temperature: config.temperature,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key_var: config.api_key_var().to_string(),
            api_key: config.api_key(),
            client,
        })
    }

    fn key(&self) -> Result<&str, QaError> {
        self.api_key.as_deref().ok_or_else(|| {
            QaError::Config(format!("{} environment variable not set", self.api_key_var))
        })
    }

    async fn post(
        &self,
        service: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, QaError> {
        let response = request
            .send()
            .await
            .map_err(|e| QaError::Llm(format!("{} request failed: {}", service, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QaError::Llm(format!(
                "{} API error {}: {}",
                service, status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| QaError::Llm(format!("{} returned invalid JSON: {}", service, e)))
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    endpoint: Endpoint,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig) -> Result<Self, QaError> {
        Ok(Self {
            endpoint: Endpoint::new(config, "https://generativelanguage.googleapis.com/v1beta")?,
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, QaError> {
        let ep = &self.endpoint;
        let key = ep.key()?;
        let url = format!("{}/models/{}:generateContent", ep.base_url, ep.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": ep.temperature },
        });

        debug!(model = %ep.model, prompt_chars = prompt.len(), "calling Gemini");
        let json = ep
            .post(
                "Gemini",
                ep.client
                    .post(url)
                    .header("x-goog-api-key", key)
                    .json(&body),
            )
            .await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &Value) -> Result<String, QaError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing candidates");
            QaError::Llm(format!("Gemini returned no answer: {}", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(QaError::Llm("Gemini returned an empty answer".to_string()));
    }
    Ok(text.trim().to_string())
}

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    endpoint: Endpoint,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self, QaError> {
        Ok(Self {
            endpoint: Endpoint::new(config, "https://api.openai.com/v1")?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, QaError> {
        let ep = &self.endpoint;
        let key = ep.key()?;
        let body = json!({
            "model": ep.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": ep.temperature,
        });

        debug!(model = %ep.model, prompt_chars = prompt.len(), "calling chat completions");
        let json = ep
            .post(
                "OpenAI",
                ep.client
                    .post(format!("{}/chat/completions", ep.base_url))
                    .bearer_auth(key)
                    .json(&body),
            )
            .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &Value) -> Result<String, QaError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| QaError::Llm("Invalid chat response: missing choices".to_string()))?;

    if text.trim().is_empty() {
        return Err(QaError::Llm("model returned an empty answer".to_string()));
    }
    Ok(text.trim().to_string())
}

/// Fails with [`QaError::Config`] when the credential variable is unset.
pub fn ensure_api_key(config: &LlmConfig) -> Result<(), QaError> {
    match config.api_key() {
        Some(_) => Ok(()),
        None => Err(QaError::Config(format!(
            "{} environment variable not set",
            config.api_key_var()
        ))),
    }
}

/// Create the [`ChatModel`] selected by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>, QaError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => Err(QaError::Config(format!("Unknown llm provider: {}", other))),
    }
}
