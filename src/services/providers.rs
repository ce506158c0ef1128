// Generative Model Providers
// Implements Anthropic Messages and OpenAI-compatible chat calls behind the
// `TextModel` seam used by the detector.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::config_store::{ConfigStore, ModelConfig};

const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured for {0}")]
    MissingApiKey(String),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

/// Text-completion collaborator. Any vendor satisfying this is interchangeable.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;

    /// `provider:model` label for logs.
    fn label(&self) -> String {
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        match name.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ProviderError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => ANTHROPIC_DEFAULT_MODEL,
            Self::OpenAi => OPENAI_DEFAULT_MODEL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

pub struct ProviderClient {
    client: Client,
    anthropic_url: String,
    openai_url: String,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(80))
    }
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let anthropic_url =
            env::var("ANTHROPIC_API_URL").unwrap_or_else(|_| ANTHROPIC_DEFAULT_URL.to_string());
        let openai_url =
            env::var("OPENAI_API_URL").unwrap_or_else(|_| OPENAI_DEFAULT_URL.to_string());

        Self {
            client,
            anthropic_url,
            openai_url,
        }
    }

    pub async fn call_anthropic(
        &self,
        custom_url: Option<&str>,
        model: &str,
        api_key: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatResult, ProviderError> {
        #[derive(Serialize)]
        struct AnthropicRequest {
            model: String,
            max_tokens: u32,
            messages: Vec<ChatMessage>,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Option<Vec<AnthropicContent>>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            text: Option<String>,
        }

        let url = custom_url.unwrap_or(&self.anthropic_url);
        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .content
            .and_then(|c| c.into_iter().find_map(|part| part.text))
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult {
            content,
            latency_ms,
        })
    }

    pub async fn call_openai_chat(
        &self,
        custom_url: Option<&str>,
        model: &str,
        api_key: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatResult, ProviderError> {
        let url = custom_url.unwrap_or(&self.openai_url);
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: 0.0,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult {
            content,
            latency_ms,
        })
    }
}

/// A provider client bound to one model and key.
pub struct ModelBinding {
    client: ProviderClient,
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: Option<String>,
}

impl ModelBinding {
    pub fn new(
        client: ProviderClient,
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            kind,
            model: model.into(),
            api_key: api_key.into(),
            base_url,
        }
    }

    /// Resolve provider, model and key from config and environment.
    pub fn from_config(config: &ModelConfig, store: Option<&ConfigStore>) -> Result<Self, ProviderError> {
        let kind = ProviderKind::parse(&config.provider)?;
        let model = if config.model.trim().is_empty() {
            kind.default_model().to_string()
        } else {
            config.model.trim().to_string()
        };
        let api_key = get_api_key(kind.as_str(), store)
            .ok_or_else(|| ProviderError::MissingApiKey(kind.as_str().to_string()))?;
        let client = ProviderClient::new(Duration::from_secs(config.timeout_secs.max(1)));

        Ok(Self::new(client, kind, model, api_key, config.base_url.clone()))
    }
}

#[async_trait]
impl TextModel for ModelBinding {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
        let base_url = self.base_url.as_deref();
        let result = match self.kind {
            ProviderKind::Anthropic => {
                self.client
                    .call_anthropic(base_url, &self.model, &self.api_key, prompt, max_tokens)
                    .await?
            }
            ProviderKind::OpenAi => {
                self.client
                    .call_openai_chat(base_url, &self.model, &self.api_key, prompt, max_tokens)
                    .await?
            }
        };
        debug!(
            "[PROVIDER] {} responded chars={} latency_ms={}",
            self.label(),
            result.content.len(),
            result.latency_ms
        );
        Ok(result.content)
    }

    fn label(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.model)
    }
}

fn env_key_names(provider: &str) -> &'static [&'static str] {
    match provider {
        "anthropic" | "claude" => &["ANTHROPIC_API_KEY", "STALEGUARD_ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY", "STALEGUARD_OPENAI_API_KEY"],
        "firecrawl" => &["FIRECRAWL_API_KEY", "STALEGUARD_FIRECRAWL_API_KEY"],
        _ => &[],
    }
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str, store: Option<&ConfigStore>) -> Option<String> {
    for key in env_key_names(provider) {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    store
        .and_then(|s| s.get_api_key(provider).ok().flatten())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
