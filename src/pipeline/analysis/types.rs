use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::{AnalysisStatus, FailureKind, ProviderKind};

/// Per-request generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// One de-identified document, rendered for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub document_id: Uuid,
    pub system: String,
    pub prompt: String,
    pub provider: ProviderKind,
    pub options: AnalysisOptions,
}

/// A single measured value or observation reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    pub label: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpKind {
    Recheck,
    SpecialistReferral,
    UrgentAttention,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub kind: FollowUpKind,
    #[serde(default)]
    pub note: String,
}

/// Provider-independent shape every answer is normalized into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFields {
    pub summary: String,
    pub findings: Vec<Finding>,
    pub follow_up: Vec<FollowUp>,
    pub document_type: Option<String>,
}

impl AnalysisFields {
    pub fn summary_only(summary: &str) -> Self {
        Self {
            summary: summary.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn abnormal_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.abnormal)
    }
}

/// Outcome for one document. `status` is always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: Uuid,
    pub provider: ProviderKind,
    pub model: String,
    pub status: AnalysisStatus,
    pub fields: Option<AnalysisFields>,
    /// Provider payload kept for audit.
    pub raw_response: Option<serde_json::Value>,
    pub attempts: u32,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn ok(
        document_id: Uuid,
        provider: ProviderKind,
        model: &str,
        fields: AnalysisFields,
        raw_response: serde_json::Value,
        attempts: u32,
    ) -> Self {
        Self {
            document_id,
            provider,
            model: model.to_string(),
            status: AnalysisStatus::Ok,
            fields: Some(fields),
            raw_response: Some(raw_response),
            attempts,
            failure: None,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        document_id: Uuid,
        provider: ProviderKind,
        model: &str,
        status: AnalysisStatus,
        failure: FailureKind,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            document_id,
            provider,
            model: model.to_string(),
            status,
            fields: None,
            raw_response: None,
            attempts,
            failure: Some(failure),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AnalysisStatus::Ok
    }
}

/// Results for a batch, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<AnalysisResult>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// `None` when every document succeeded.
    pub fn partial_failure(&self) -> Option<BatchPartialFailure> {
        let failures: Vec<DocumentFailure> = self
            .results
            .iter()
            .enumerate()
            .filter_map(|(index, r)| {
                r.failure.map(|kind| DocumentFailure {
                    index,
                    document_id: r.document_id,
                    kind,
                })
            })
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(BatchPartialFailure {
                total: self.results.len(),
                failures,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub index: usize,
    pub document_id: Uuid,
    pub kind: FailureKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{} of {total} documents failed", failures.len())]
pub struct BatchPartialFailure {
    pub total: usize,
    pub failures: Vec<DocumentFailure>,
}

/// Shared stop request, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
