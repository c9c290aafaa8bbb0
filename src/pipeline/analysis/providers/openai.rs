use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use super::http::{build_client, post_json};
use super::{Provider, ProviderConfig, ProviderError, RawResponse};
use crate::models::enums::{ProviderErrorKind, ProviderKind};
use crate::pipeline::analysis::types::AnalysisRequest;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI Chat Completions, or any server speaking the same protocol.
pub struct OpenAiProvider {
    kind: ProviderKind,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: Option<&str>) -> Result<Self, ProviderError> {
        Ok(Self {
            kind: ProviderKind::OpenAi,
            client: build_client(config.timeout())?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: api_key.map(str::to_string),
            model: config.model_name().to_string(),
            timeout: config.timeout(),
        })
    }

    /// Self-hosted endpoint; the key is optional.
    pub fn compatible(config: &ProviderConfig, endpoint: &str) -> Result<Self, ProviderError> {
        let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty());
        Ok(Self {
            kind: ProviderKind::OpenAiCompatible,
            endpoint: endpoint.to_string(),
            ..Self::new(config, api_key)?
        })
    }
}

pub fn build_payload(request: &AnalysisRequest) -> Value {
    let mut payload = json!({
        "model": request.options.model,
        "max_tokens": request.options.max_tokens,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.prompt}
        ]
    });
    if let Some(temperature) = request.options.temperature {
        payload["temperature"] = json!(temperature);
    }
    payload
}

pub fn extract_answer(reply: &Value) -> Result<String, ProviderError> {
    let choice = &reply["choices"][0];
    if choice.is_null() {
        return Err(ProviderError::malformed("no choices in chat completion"));
    }

    if choice["finish_reason"].as_str() == Some("content_filter")
        || choice["message"]["refusal"].as_str().is_some()
    {
        return Err(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            "completion blocked by content filter",
        ));
    }

    choice["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::malformed("no message content in chat completion"))
}

impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let bearer = self.api_key.as_ref().map(|k| format!("Bearer {k}"));
        let headers: Vec<(&str, &str)> = bearer
            .as_deref()
            .map(|b| ("authorization", b))
            .into_iter()
            .collect();

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
