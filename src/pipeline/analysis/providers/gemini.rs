use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use super::http::{build_client, post_json};
use super::{Provider, ProviderConfig, ProviderError, RawResponse};
use crate::models::enums::{ProviderErrorKind, ProviderKind};
use crate::pipeline::analysis::types::AnalysisRequest;

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Finish reasons Gemini uses when a candidate is withheld.
const BLOCKED_FINISH: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

/// Google Gemini `generateContent`.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self, ProviderError> {
        let model = config.model_name().to_string();
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_BASE}/{model}:generateContent"));
        Ok(Self {
            client: build_client(config.timeout())?,
            endpoint,
            api_key: api_key.to_string(),
            model,
            timeout: config.timeout(),
        })
    }
}

pub fn build_payload(request: &AnalysisRequest) -> Value {
    let mut generation = json!({"maxOutputTokens": request.options.max_tokens});
    if let Some(temperature) = request.options.temperature {
        generation["temperature"] = json!(temperature);
    }
    json!({
        "systemInstruction": {"parts": [{"text": request.system}]},
        "contents": [
            {"role": "user", "parts": [{"text": request.prompt}]}
        ],
        "generationConfig": generation
    })
}

pub fn extract_answer(reply: &Value) -> Result<String, ProviderError> {
    if let Some(reason) = reply["promptFeedback"]["blockReason"].as_str() {
        return Err(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            format!("prompt blocked: {reason}"),
        ));
    }

    let candidate = &reply["candidates"][0];
    if candidate.is_null() {
        return Err(ProviderError::malformed("no candidates in Gemini reply"));
    }

    if let Some(reason) = candidate["finishReason"].as_str() {
        if BLOCKED_FINISH.contains(&reason) {
            return Err(ProviderError::new(
                ProviderErrorKind::ContentPolicy,
                format!("candidate withheld: {reason}"),
            ));
        }
    }

    let text: Vec<&str> = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::malformed("no text parts in Gemini reply"));
    }
    Ok(text.concat())
}

impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn submit(&self, request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let headers = [("x-goog-api-key", self.api_key.as_str())];
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
