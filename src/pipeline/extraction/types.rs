use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExtractionError;
use crate::models::enums::StrategyKind;

/// Result of layout extraction for a single document: the best-scoring
/// strategy output plus the audit trail of every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: Uuid,
    pub strategy: StrategyKind,
    pub text: String,
    pub score: f32,
    pub page_count: usize,
    pub tables: Vec<TableRegion>,
    pub attempts: Vec<StrategyAttempt>,
    pub warnings: Vec<ExtractionWarning>,
}

impl ExtractionResult {
    /// No usable text layer: nothing downstream can work with this document.
    pub fn is_unprocessable(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One strategy run, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub score: f32,
    pub failed: bool,
}

/// Column-aligned block detected by the table strategy.
/// Line indices refer to lines of the serialized text (0-based, inclusive).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRegion {
    pub page: usize,
    pub first_line: usize,
    pub last_line: usize,
    pub column_count: usize,
}

/// Warnings about extraction quality
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExtractionWarning {
    /// A strategy could not parse the document; recorded as a zero-score attempt.
    StrategyFailed { strategy: StrategyKind, reason: String },
    /// No attempt reached the acceptability threshold.
    BelowThreshold { best: f32, threshold: f32 },
    /// Pages with no text at all (likely scanned images).
    EmptyPages { pages: Vec<usize> },
    /// No strategy produced any text.
    NoTextLayer,
}

/// Raw output of one strategy, before sanitization and scoring.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub text: String,
    pub page_count: usize,
    pub tables: Vec<TableRegion>,
    /// 1-based numbers of pages that yielded no text.
    pub empty_pages: Vec<usize>,
}

/// One way of turning PDF bytes into text.
pub trait ExtractionStrategy {
    fn kind(&self) -> StrategyKind;

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError>;
}
