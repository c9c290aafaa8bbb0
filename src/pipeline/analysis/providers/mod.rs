pub mod anthropic;
pub mod cli;
pub mod gemini;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod stub;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::parser::parse_analysis_answer;
use super::retry::RetryPolicy;
use super::types::{AnalysisFields, AnalysisOptions, AnalysisRequest};
use crate::models::enums::{ProviderErrorKind, ProviderKind};

pub use anthropic::AnthropicProvider;
pub use cli::CliProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use stub::StubProvider;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedResponse, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Provider payload before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Json(Value),
    Text(String),
}

impl RawResponse {
    /// Value stored on the result for audit.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

/// A language-model backend.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// One call, no retries.
    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError>;

    /// Pull the answer text out of this backend's payload shape. Refusals
    /// become `ContentPolicy` errors.
    fn answer_text(&self, raw: &RawResponse) -> Result<String, ProviderError>;

    fn normalize(&self, raw: &RawResponse) -> Result<AnalysisFields, ProviderError> {
        let text = self.answer_text(raw)?;
        if text.trim().is_empty() {
            return Err(ProviderError::malformed("empty answer"));
        }
        Ok(parse_analysis_answer(&text))
    }
}

/// How to reach one backend.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: Option<String>,
    /// Overrides the backend's default URL; required for `openai_compatible`.
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Program and arguments for the `cli` backend.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            kind: ProviderKind::Ollama,
            model: None,
            endpoint: None,
            api_key: None,
            command: Vec::new(),
            timeout_secs: 120,
            max_attempts: retry.max_attempts,
            backoff_base_ms: retry.base_ms,
            backoff_cap_ms: retry.cap_ms,
            temperature: Some(0.1),
            max_tokens: 2048,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("command", &self.command)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderConfig {
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.kind.default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_ms: self.backoff_base_ms,
            cap_ms: self.backoff_cap_ms,
        }
    }

    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            model: self.model_name().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Auth,
                format!("no API key configured for {}", self.kind),
            )
        })
    }
}

/// Build the backend named by `config`.
pub fn build_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    let provider: Box<dyn Provider> = match config.kind {
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(config, config.require_key()?)?),
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(config, Some(config.require_key()?))?),
        ProviderKind::OpenAiCompatible => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::Unavailable,
                    "openai_compatible needs an endpoint",
                )
            })?;
            Box::new(OpenAiProvider::compatible(config, endpoint)?)
        }
        ProviderKind::Gemini => Box::new(GeminiProvider::new(config, config.require_key()?)?),
        ProviderKind::Ollama => Box::new(OllamaProvider::new(config)?),
        ProviderKind::Cli => Box::new(CliProvider::new(config)?),
        ProviderKind::Stub => Box::new(StubProvider::default()),
    };

    tracing::info!(
        provider = %provider.kind(),
        model = provider.model(),
        "Analysis provider ready"
    );
    Ok(provider)
}
