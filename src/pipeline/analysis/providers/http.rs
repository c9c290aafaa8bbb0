//! Blocking JSON transport shared by the HTTP backends.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use super::ProviderError;
use crate::models::enums::ProviderErrorKind;

/// Longest slice of an error body kept in messages.
const MAX_ERROR_BODY: usize = 300;

const POLICY_MARKERS: &[&str] = &[
    "content_policy",
    "content policy",
    "content_filter",
    "safety",
    "responsible_ai",
];

pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::new(ProviderErrorKind::Unavailable, e.to_string()))
}

/// POST `body` and return the decoded reply, classifying every failure.
pub fn post_json(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &Value,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request
        .send()
        .map_err(|e| transport_error(&e, url, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let kind = classify_status(status.as_u16(), &body);
        return Err(ProviderError::new(
            kind,
            format!("HTTP {}: {}", status.as_u16(), clip(&body)),
        ));
    }

    response
        .json::<Value>()
        .map_err(|e| ProviderError::malformed(format!("invalid JSON reply: {e}")))
}

pub fn classify_status(status: u16, body: &str) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::Server,
        401 | 403 => ProviderErrorKind::Auth,
        _ if names_content_policy(body) => ProviderErrorKind::ContentPolicy,
        _ => ProviderErrorKind::MalformedRequest,
    }
}

pub fn names_content_policy(body: &str) -> bool {
    let lowered = body.to_lowercase();
    POLICY_MARKERS.iter().any(|m| lowered.contains(m))
}

fn transport_error(e: &reqwest::Error, url: &str, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::new(
            ProviderErrorKind::Timeout,
            format!("request timed out after {}s", timeout.as_secs()),
        )
    } else if e.is_connect() {
        ProviderError::new(
            ProviderErrorKind::Connection,
            format!("cannot connect to {url}"),
        )
    } else {
        ProviderError::new(ProviderErrorKind::Connection, e.to_string())
    }
}

fn clip(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Join `base` and `path` without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(classify_status(429, ""), ProviderErrorKind::RateLimited);
        assert_eq!(classify_status(500, ""), ProviderErrorKind::Server);
        assert_eq!(classify_status(503, "overloaded"), ProviderErrorKind::Server);
        assert_eq!(classify_status(401, ""), ProviderErrorKind::Auth);
        assert_eq!(classify_status(403, ""), ProviderErrorKind::Auth);
        assert_eq!(classify_status(400, r#"{"error":"bad field"}"#), ProviderErrorKind::MalformedRequest);
        assert_eq!(classify_status(404, ""), ProviderErrorKind::MalformedRequest);
    }

    #[test]
    fn policy_body_becomes_content_policy() {
        let body = r#"{"error":{"code":"content_policy_violation","message":"..."}}"#;
        assert_eq!(classify_status(400, body), ProviderErrorKind::ContentPolicy);
        assert_eq!(classify_status(400, "blocked by SAFETY settings"), ProviderErrorKind::ContentPolicy);
    }

    #[test]
    fn server_errors_stay_transient_even_with_policy_words() {
        assert_eq!(classify_status(500, "safety service down"), ProviderErrorKind::Server);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let body = "è".repeat(400);
        assert!(clip(&body).len() <= MAX_ERROR_BODY);
    }

    #[test]
    fn url_join() {
        assert_eq!(join_url("http://localhost:11434/", "/api/generate"), "http://localhost:11434/api/generate");
        assert_eq!(join_url("http://h", "api"), "http://h/api");
    }

    #[test]
    fn unreachable_host_is_connection_class() {
        let client = build_client(Duration::from_secs(2)).unwrap();
        let err = post_json(
            &client,
            "http://127.0.0.1:1/api/generate",
            &[],
            &serde_json::json!({}),
            Duration::from_secs(2),
        )
        .unwrap_err();
        assert!(err.is_transient());
    }
}
