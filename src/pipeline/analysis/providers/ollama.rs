use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::{build_client, join_url, post_json};
use super::{Provider, ProviderConfig, ProviderError, RawResponse};
use crate::models::enums::ProviderKind;
use crate::pipeline::analysis::types::AnalysisRequest;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama HTTP client for local inference.
pub struct OllamaProvider {
    base_url: String,
    client: Client,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config.endpoint.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(config.timeout())?,
            model: config.model_name().to_string(),
            timeout: config.timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub fn build_payload(request: &AnalysisRequest) -> Result<Value, ProviderError> {
    let body = GenerateRequest {
        model: &request.options.model,
        prompt: &request.prompt,
        system: &request.system,
        stream: false,
        options: GenerateOptions {
            temperature: request.options.temperature,
            num_predict: request.options.max_tokens,
        },
    };
    serde_json::to_value(body).map_err(|e| ProviderError::malformed(e.to_string()))
}

pub fn extract_answer(reply: &Value) -> Result<String, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_value(reply.clone())
        .map_err(|e| ProviderError::malformed(format!("unexpected Ollama reply: {e}")))?;
    Ok(parsed.response)
}

impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let url = join_url(&self.base_url, "api/generate");
        post_json(&self.client, &url, &[], &build_payload(request)?, self.timeout)
            .map(RawResponse::Json)
    }

    fn answer_text(&self, raw: &RawResponse) -> Result<String, ProviderError> {
        match raw {
            RawResponse::Json(reply) => extract_answer(reply),
            RawResponse::Text(_) => Err(ProviderError::malformed("expected a JSON reply")),
        }
    }
}
