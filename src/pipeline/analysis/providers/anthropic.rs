use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use super::http::{build_client, post_json};
use super::{Provider, ProviderConfig, ProviderError, RawResponse};
use crate::models::enums::{ProviderErrorKind, ProviderKind};
use crate::pipeline::analysis::types::AnalysisRequest;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API.
pub struct AnthropicProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config.timeout())?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: api_key.to_string(),
            model: config.model_name().to_string(),
            timeout: config.timeout(),
        })
    }
}

pub fn build_payload(request: &AnalysisRequest) -> Value {
    let mut payload = json!({
        "model": request.options.model,
        "max_tokens": request.options.max_tokens,
        "system": request.system,
        "messages": [
            {"role": "user", "content": request.prompt}
        ]
    });
    if let Some(temperature) = request.options.temperature {
        payload["temperature"] = json!(temperature);
    }
    payload
}

/// Concatenate the text blocks of a Messages reply.
pub fn extract_answer(reply: &Value) -> Result<String, ProviderError> {
    if reply["stop_reason"].as_str() == Some("refusal") {
        return Err(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            "model refused the request",
        ));
    }

    let blocks = reply["content"]
        .as_array()
        .ok_or_else(|| ProviderError::malformed("no content in Anthropic reply"))?;

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b["type"].as_str() == Some("text"))
        .filter_map(|b| b["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(ProviderError::malformed("no text block in Anthropic reply"));
    }
    Ok(text.join("\n"))
}

impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", API_VERSION),
        ];
        post_json(
            &self.client,
            &self.endpoint,
            &headers,
            &build_payload(request),
            self.timeout,
        )
        .map(RawResponse::Json)
    }

    fn answer_text(&self, raw: &RawResponse) -> Result<String, ProviderError> {
        match raw {
            RawResponse::Json(reply) => extract_answer(reply),
            RawResponse::Text(_) => Err(ProviderError::malformed("expected a JSON reply")),
        }
    }
}
