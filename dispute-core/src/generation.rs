//! Generative text client
//!
//! Provides a `GenerativeClient` trait with one production implementation,
//! `ChatCompletionsClient`, that speaks the OpenAI-compatible
//! `/chat/completions` protocol. Callers that need a guaranteed value wrap
//! it (see `narrative::NarrativeEnricher`); this layer only reports errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::GenerationConfig;

// ============================================================================
// Trait and request type
// ============================================================================

/// One system + user prompt pair sent to a generative model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Abstraction over text-generation providers.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Return the model's reply, trimmed. Empty replies are an error.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;

    /// Client name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing API key (set {env})")]
    MissingApiKey { env: String },

    #[error("All {attempts} attempts failed, last error: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl GenerationError {
    /// Transport failures, rate limits and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Http(_) => true,
            GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Extra attempts after the first; 0 means exactly one request.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ChatCompletionsConfig {
    /// Build from the `[generation]` section, reading the key from the named env var.
    pub fn from_generation(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| GenerationError::MissingApiKey {
                env: config.api_key_env.clone(),
            })?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            max_retries: config.max_retries,
            retry_delay_ms: 500,
        })
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
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
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: Option<ChatErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
}

// ============================================================================
// ChatCompletionsClient
// ============================================================================

/// Client for any OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    config: ChatCompletionsConfig,
    endpoint: String,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey {
                env: "api_key".to_string(),
            });
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ChatErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::debug!(code = status.as_u16(), message = %message, "chat completions API error");

            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let raw = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "response contained no completion text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerativeClient for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        if self.config.max_retries == 0 {
            return self.complete_once(request).await;
        }

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::start(
            retry_strategy,
            || self.complete_once(request),
            GenerationError::is_transient,
        )
        .await
        .map_err(|e| {
            if e.is_transient() {
                GenerationError::RetryExhausted {
                    attempts: self.config.max_retries + 1,
                    last: e.to_string(),
                }
            } else {
                e
            }
        })
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

// ============================================================================
// TESTS
// ============================================================================
