//! `GenerativeClient` trait and its two REST implementations.
//!
//! * [`GeminiClient`] calls Google's `generateContent` endpoint.
//! * [`OpenAiClient`] calls any OpenAI-compatible `/v1/chat/completions`
//!   endpoint (OpenAI, Groq, Ollama in OpenAI mode, vLLM, ...).
//!
//! Both send a single prompt and hand back the model's raw text; parsing the
//! text is the extractor's job.  All connection details come from
//! [`LlmConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{LlmConfig, LlmProvider};

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the generative-language service.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The service answered with a non-success status code.
    #[error("LLM service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The LLM returned a response with no usable text content.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// GenerativeClient trait
// ---------------------------------------------------------------------------

/// Sends one prompt to a generative-language model and returns its text.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn GenerativeClient>`.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Build the client matching `config.provider`, authenticated with
/// `credential`.
pub fn client_from_config(config: &LlmConfig, credential: String) -> Arc<dyn GenerativeClient> {
    match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient::new(config, credential)),
        LlmProvider::OpenAiCompatible => Arc::new(OpenAiClient::new(config, credential)),
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

async fn read_json(response: reqwest::Response) -> Result<Value, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// Calls `POST {base_url}/v1beta/models/{model}:generateContent`.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Concatenated text parts of the first Gemini candidate.
pub fn gemini_text(json: &Value) -> Result<String, LlmError> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(LlmError::EmptyResponse)?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": { "temperature": self.temperature }
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        gemini_text(&read_json(response).await?)
    }
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Message content of the first chat-completion choice.
pub fn openai_text(json: &Value) -> Result<String, LlmError> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(LlmError::EmptyResponse)?
        .trim();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[async_trait]
impl GenerativeClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model":    self.model,
            "messages": [ { "role": "user", "content": prompt } ],
            "stream":   false,
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        openai_text(&read_json(response).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
