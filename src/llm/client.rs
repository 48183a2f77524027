//! Generation client trait and the Anthropic implementation.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

use super::types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};

/// Text generation provider.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion for the request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Provider name used in errors and logs.
    fn provider(&self) -> &str;
}

/// Configuration for the HTTP generation client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 120,
        }
    }

    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and
    /// `NARRATIVE_MEMORY_LLM_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
            default_model: None,
            timeout_secs: std::env::var("NARRATIVE_MEMORY_LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const PROVIDER: &'static str = "anthropic";
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const DEFAULT_MODEL: &'static str = "claude-3-5-sonnet-20241022";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }

    fn api_request(&self, request: CompletionRequest) -> AnthropicRequest {
        let model = request
            .model
            .or_else(|| self.config.default_model.clone())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        AnthropicRequest {
            model,
            messages: request
                .messages
                .into_iter()
                .map(|m| AnthropicMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                })
                .collect(),
            max_tokens: request.max_tokens.unwrap_or(1024),
            system: request.system,
            temperature: request.temperature,
            stop_sequences: request.stop,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

/// Turn a Messages API reply into a response or a generation error.
fn parse_response(status: StatusCode, body: &str) -> Result<CompletionResponse> {
    let provider = AnthropicClient::PROVIDER;

    if !status.is_success() {
        return Err(match serde_json::from_str::<AnthropicError>(body) {
            Ok(error) => Error::generation(
                provider,
                format!("{} ({}): {}", status, error.error.error_type, error.error.message),
            ),
            Err(_) => Error::generation(provider, format!("{}: {}", status, body)),
        });
    }

    let reply: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| Error::generation(provider, format!("Failed to parse response: {}", e)))?;

    let content = reply
        .content
        .into_iter()
        .filter_map(|c| c.text)
        .collect::<Vec<_>>()
        .join("");

    Ok(CompletionResponse {
        id: reply.id,
        model: reply.model,
        content,
        stop_reason: reply.stop_reason.as_deref().map(StopReason::from_provider),
        usage: TokenUsage {
            input_tokens: reply.usage.input_tokens,
            output_tokens: reply.usage.output_tokens,
        },
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl LLMClient for AnthropicClient {
    #[instrument(skip(self, request), fields(model = ?request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.api_request(request);
        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::generation(Self::PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::generation(Self::PROVIDER, format!("Failed to read response: {}", e))
        })?;

        let completion = parse_response(status, &body)?;
        debug!(
            model = %completion.model,
            tokens = completion.usage.total(),
            "Completion received"
        );
        Ok(completion)
    }

    fn provider(&self) -> &str {
        Self::PROVIDER
    }
}
