use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::models::enums::{DocumentType, FieldKind, IntegrityStatus, RuleLayer, StrategyKind};

/// A located identifying value. Lives only for the redaction step; the
/// literal is wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct FieldMatch {
    pub kind: FieldKind,
    /// Byte offsets into the text that was scanned.
    pub start: usize,
    pub end: usize,
    pub literal: String,
    pub layer: RuleLayer,
}

impl FieldMatch {
    pub fn new(kind: FieldKind, start: usize, end: usize, literal: &str, layer: RuleLayer) -> Self {
        Self {
            kind,
            start,
            end,
            literal: literal.to_string(),
            layer,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &FieldMatch) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Audit record without the literal.
    pub fn record(&self) -> RedactionRecord {
        RedactionRecord {
            kind: self.kind,
            start: self.start,
            end: self.end,
            layer: self.layer,
        }
    }
}

impl Drop for FieldMatch {
    fn drop(&mut self) {
        self.literal.zeroize();
    }
}

impl std::fmt::Debug for FieldMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMatch")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("literal", &format_args!("<{} bytes>", self.literal.len()))
            .field("layer", &self.layer)
            .finish()
    }
}

/// What was replaced and where (offsets into the extracted text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRecord {
    pub kind: FieldKind,
    pub start: usize,
    pub end: usize,
    pub layer: RuleLayer,
}

/// De-identified text ready for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedText {
    pub document_id: Uuid,
    pub profile_id: String,
    /// Type declared by the profile, when it has one.
    pub document_type: Option<DocumentType>,
    pub text: String,
    pub records: Vec<RedactionRecord>,
    pub integrity: IntegrityStatus,
    pub strategy: StrategyKind,
    pub extraction_score: f32,
    /// No text layer: nothing was redacted and nothing should be analysed.
    pub unprocessable: bool,
}

impl RedactedText {
    /// Safe to hand to a provider.
    pub fn is_submittable(&self) -> bool {
        !self.unprocessable && self.integrity == IntegrityStatus::Verified
    }

    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Redact every date, not only those introduced by a birth cue.
    pub redact_all_dates: bool,
}
