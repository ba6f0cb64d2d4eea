use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EndpointError;

/// Environment variable that overrides the provider-specific key variable
pub const API_KEY_ENV: &str = "CALLSIGHT_API_KEY";

/// A chat-style text completion endpoint
///
/// The classifier only needs "system + user prompt in, text out"; tests script
/// this trait instead of talking to a real model.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, EndpointError>;
}

/// Wire protocol spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI-compatible chat completions (NVIDIA NIM, vLLM, ...)
    OpenaiCompatible,
}

impl Provider {
    fn key_env(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenaiCompatible => "NVIDIA_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::OpenaiCompatible => "https://integrate.api.nvidia.com/v1",
        }
    }
}

/// Configuration for the LLM client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Base URL; the provider default when unset
    pub base_url: Option<String>,
    pub model: String,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    pub top_p: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Never read from config files, only from the environment
    #[serde(skip)]
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenaiCompatible,
            base_url: None,
            model: "nvidia/nemotron-4-mini-hindi-4b-instruct".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: 4096,
            timeout_secs: 120,
            api_key: String::new(),
        }
    }
}

impl LlmConfig {
    /// Fill in the API key from the environment
    pub fn with_api_key_from_env(mut self) -> Result<Self> {
        let key_env = self.provider.key_env();
        let api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(key_env))
            .with_context(|| format!("{API_KEY_ENV} or {key_env} environment variable not set"))?;
        if api_key.trim().is_empty() {
            anyhow::bail!("{key_env} is set but empty");
        }
        self.api_key = api_key.trim().to_string();
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
    }
}

/// HTTP client for the configured LLM endpoint
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("no API key configured for {:?}", config.provider);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn send_anthropic(&self, system: &str, user: &str) -> Result<String, EndpointError> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: Some(system.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let response: AnthropicResponse = response.json().await.map_err(transport_error)?;

        // Concatenate text blocks; tool-use blocks are not requested
        Ok(response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn send_chat(&self, system: &str, user: &str) -> Result<String, EndpointError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            stream: false,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let response: ChatResponse = response.json().await.map_err(transport_error)?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, EndpointError> {
        debug!(
            "Sending {} prompt chars to {} ({:?})",
            system.len() + user.len(),
            self.config.model,
            self.config.provider
        );
        match self.config.provider {
            Provider::Anthropic => self.send_anthropic(system, user).await,
            Provider::OpenaiCompatible => self.send_chat(system, user).await,
        }
    }
}

fn transport_error(err: reqwest::Error) -> EndpointError {
    EndpointError::Transport {
        retryable: err.is_timeout() || err.is_connect() || err.is_request() || err.is_decode(),
        message: err.to_string(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EndpointError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(EndpointError::Status {
        status: status.as_u16(),
        body,
        retry_after_secs,
    })
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}
