use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::json;

use super::{Provider, ProviderError, RawResponse};
use crate::models::enums::{ProviderErrorKind, ProviderKind};
use crate::pipeline::analysis::types::AnalysisRequest;

const DEFAULT_ANSWER: &str = r#"{"summary": "Analisi simulata: nessun modello interrogato.", "findings": [], "follow_up": []}"#;

/// Scripted backend. Plays its script in order, then repeats the fallback.
pub struct StubProvider {
    script: Mutex<VecDeque<Result<String, ProviderErrorKind>>>,
    fallback: Result<String, ProviderErrorKind>,
    calls: AtomicUsize,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::answering(DEFAULT_ANSWER)
    }
}

impl StubProvider {
    /// Always returns `answer`.
    pub fn answering(answer: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(answer.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `kind`.
    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Err(kind),
            calls: AtomicUsize::new(0),
        }
    }

    /// Plays `outcomes` first, one per call.
    pub fn with_script(mut self, outcomes: Vec<Result<String, ProviderErrorKind>>) -> Self {
        self.script = Mutex::new(outcomes.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<String, ProviderErrorKind> {
        let scripted = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

impl Provider for StubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stub
    }

    fn model(&self) -> &str {
        "stub"
    }

    fn submit(&self, _request: &AnalysisRequest) -> Result<RawResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.next_outcome() {
            Ok(answer) => Ok(RawResponse::Json(json!({"answer": answer}))),
            Err(kind) => Err(ProviderError::new(kind, format!("scripted failure on call {call}"))),
        }
    }

    fn answer_text(&self, raw: &RawResponse) -> Result<String, ProviderError> {
        match raw {
            RawResponse::Json(v) => v["answer"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ProviderError::malformed("stub reply without answer")),
            RawResponse::Text(s) => Ok(s.clone()),
        }
    }
}
