//! Document pipeline driver.
//!
//! Wires the four stages for a batch of reports:
//! resolve profile → extract text → redact → analyse.
//!
//! Stages are injected so the driver stays testable with stub providers.
//! It performs no file or database writes.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{AppConfig, ConfigError};
use crate::models::document::Document;
use crate::models::enums::{
    AnalysisStatus, FailureKind, IntegrityStatus, ProviderKind, StrategyKind,
};
use crate::pipeline::analysis::{
    AnalysisOrchestrator, AnalysisResult, CancellationFlag, ProviderError,
};
use crate::pipeline::extraction::{
    ExtractionError, ExtractionResult, ExtractionWarning, LayoutExtractor, StrategyAttempt,
};
use crate::pipeline::profiles::{self, ProfileError, ProfileRegistry};
use crate::pipeline::redaction::{RedactedText, Redactor};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that stop a document or the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Profile registry: {0}")]
    Profile(#[from] ProfileError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Analysis provider: {0}")]
    Provider(#[from] ProviderError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Extraction stage summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub strategy: StrategyKind,
    pub score: f32,
    pub page_count: usize,
    pub table_count: usize,
    pub text_length: usize,
    pub attempts: Vec<StrategyAttempt>,
    pub warnings: Vec<ExtractionWarning>,
}

impl From<&ExtractionResult> for ExtractionSummary {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            strategy: result.strategy,
            score: result.score,
            page_count: result.page_count,
            table_count: result.tables.len(),
            text_length: result.text.len(),
            attempts: result.attempts.clone(),
            warnings: result.warnings.clone(),
        }
    }
}

/// Output of resolve → extract → redact for one document.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDocument {
    pub document_id: Uuid,
    pub profile_id: &'static str,
    pub profile_name: &'static str,
    pub extraction: ExtractionSummary,
    pub redacted: RedactedText,
}

/// One line of the final report. Exactly one per input document.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEntry {
    pub document_id: Uuid,
    pub file_name: String,
    pub profile_id: Option<&'static str>,
    pub extraction: Option<ExtractionSummary>,
    pub redacted: Option<RedactedText>,
    /// Counts per placeholder kind; never the literals.
    pub redaction_counts: BTreeMap<&'static str, usize>,
    pub analysis: Option<AnalysisResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub entries: Vec<PipelineEntry>,
}

impl PipelineReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Documents that did not reach a successful end state.
    pub fn failed(&self) -> impl Iterator<Item = &PipelineEntry> {
        self.entries.iter().filter(|e| {
            e.error.is_some()
                || e.redacted
                    .as_ref()
                    .is_some_and(|r| r.integrity == IntegrityStatus::Violated)
                || e.analysis.as_ref().is_some_and(|a| !a.is_ok())
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct DocumentPipeline<'r> {
    registry: &'r ProfileRegistry,
    extractor: LayoutExtractor,
    redactor: Redactor,
    analysis: Option<AnalysisOrchestrator>,
}

impl<'r> DocumentPipeline<'r> {
    pub fn new(registry: &'r ProfileRegistry, extractor: LayoutExtractor, redactor: Redactor) -> Self {
        Self {
            registry,
            extractor,
            redactor,
            analysis: None,
        }
    }

    /// Without an orchestrator the pipeline stops after redaction.
    pub fn with_analysis(mut self, orchestrator: AnalysisOrchestrator) -> Self {
        self.analysis = Some(orchestrator);
        self
    }

    pub fn registry(&self) -> &ProfileRegistry {
        self.registry
    }

    /// Resolve, extract and redact one document.
    pub fn prepare(&self, document: &Document) -> Result<PreparedDocument, PipelineError> {
        let _span = tracing::info_span!("prepare_document", doc_id = %document.id).entered();

        let profile = self.registry.resolve_document(document);
        let extraction = self.extractor.extract(document, profile)?;
        let redacted = self.redactor.redact(&extraction, profile);

        Ok(PreparedDocument {
            document_id: document.id,
            profile_id: profile.id,
            profile_name: profile.display_name,
            extraction: ExtractionSummary::from(&extraction),
            redacted,
        })
    }

    /// Prepare every document, then analyse the batch. Entries follow
    /// input order; a document that cannot be read gets an error entry.
    pub fn run(&self, documents: &[Document], cancel: &CancellationFlag) -> PipelineReport {
        let mut entries = Vec::with_capacity(documents.len());
        let mut batch: Vec<RedactedText> = Vec::new();
        let mut batch_slots: Vec<usize> = Vec::new();

        for document in documents {
            if cancel.is_cancelled() {
                entries.push(self.cancelled_entry(document));
                continue;
            }

            match self.prepare(document) {
                Ok(prepared) => {
                    batch_slots.push(entries.len());
                    batch.push(prepared.redacted.clone());
                    entries.push(PipelineEntry {
                        document_id: document.id,
                        file_name: document.file_name.clone(),
                        profile_id: Some(prepared.profile_id),
                        redaction_counts: prepared.redacted.counts_by_kind(),
                        extraction: Some(prepared.extraction),
                        redacted: Some(prepared.redacted),
                        analysis: None,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(doc_id = %document.id, error = %e, "Document skipped");
                    let analysis = self.analysis.as_ref().map(|orchestrator| {
                        let provider = orchestrator.provider();
                        AnalysisResult::failed(
                            document.id,
                            provider.kind(),
                            provider.model(),
                            AnalysisStatus::Rejected,
                            FailureKind::Extraction,
                            0,
                            e.to_string(),
                        )
                    });
                    entries.push(PipelineEntry {
                        document_id: document.id,
                        file_name: document.file_name.clone(),
                        profile_id: None,
                        extraction: None,
                        redacted: None,
                        redaction_counts: BTreeMap::new(),
                        analysis,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if let Some(orchestrator) = &self.analysis {
            let report = orchestrator.analyze(&batch, cancel);
            for (slot, result) in batch_slots.into_iter().zip(report.results) {
                entries[slot].analysis = Some(result);
            }
        }

        PipelineReport { entries }
    }

    fn cancelled_entry(&self, document: &Document) -> PipelineEntry {
        let analysis = self.analysis.as_ref().map(|orchestrator| {
            let provider = orchestrator.provider();
            AnalysisResult::failed(
                document.id,
                provider.kind(),
                provider.model(),
                AnalysisStatus::Rejected,
                FailureKind::Cancelled,
                0,
                "cancelled before preparation",
            )
        });
        PipelineEntry {
            document_id: document.id,
            file_name: document.file_name.clone(),
            profile_id: None,
            extraction: None,
            redacted: None,
            redaction_counts: BTreeMap::new(),
            analysis,
            error: Some(FailureKind::Cancelled.user_action().to_string()),
        }
    }
}

impl DocumentPipeline<'static> {
    /// Build from configuration using the process-wide registry.
    /// `analyse = false` stops after redaction.
    pub fn from_config(config: &AppConfig, analyse: bool) -> Result<Self, PipelineError> {
        let registry = profiles::init_global(&config.profile_overrides())?;
        let pipeline = Self::new(
            registry,
            LayoutExtractor::new(config.extraction_config()),
            Redactor::new(config.redaction),
        );
        if !analyse {
            return Ok(pipeline);
        }
        if config.provider.kind == ProviderKind::Stub {
            tracing::warn!("Stub provider configured: no model will be queried");
        }
        Ok(pipeline.with_analysis(AnalysisOrchestrator::from_config(&config.provider)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentMetadata;
    use crate::models::enums::FieldKind;
    use crate::pipeline::analysis::providers::StubProvider;
    use crate::pipeline::analysis::RetryPolicy;
    use crate::pipeline::extraction::pdf::test_pdf::{make_blank_pdf, make_positioned_pdf};
    use crate::pipeline::extraction::ExtractionConfig;
    use crate::pipeline::redaction::RedactionConfig;

    const CANNED: &str = r#"{"summary": "Esami nella norma.", "document_type": "laboratorio", "findings": [{"label": "Glucosio", "value": "95", "unit": "mg/dL", "abnormal": false}], "follow_up": []}"#;

    fn lab_pdf() -> Vec<u8> {
        make_positioned_pdf(&[&[
            (72.0, 760.0, "SYNLAB Italia - Referto di laboratorio"),
            (72.0, 740.0, "Paziente: ROSSI MARIO"),
            (72.0, 726.0, "Codice Fiscale: RSSMRA80A01H501U"),
            (72.0, 700.0, "Esame"),
            (300.0, 700.0, "Risultato"),
            (72.0, 686.0, "Glucosio"),
            (300.0, 686.0, "95 mg/dL"),
            (72.0, 672.0, "Colesterolo totale"),
            (300.0, 672.0, "180 mg/dL"),
            (72.0, 658.0, "Emoglobina"),
            (300.0, 658.0, "13,5 g/dL"),
            (72.0, 630.0, "Firmato ROSSI MARIO non presente"),
        ]])
    }

    fn synlab_document(bytes: Vec<u8>) -> Document {
        Document::from_bytes(
            "referto_labs_synlab.pdf",
            bytes,
            DocumentMetadata {
                facility: Some("SYNLAB".into()),
                ..Default::default()
            },
        )
    }

    fn pipeline(registry: &ProfileRegistry, stub: StubProvider) -> DocumentPipeline<'_> {
        DocumentPipeline::new(
            registry,
            LayoutExtractor::new(ExtractionConfig::default()),
            Redactor::new(RedactionConfig::default()),
        )
        .with_analysis(AnalysisOrchestrator::new(Box::new(stub), RetryPolicy::immediate(3)))
    }

    #[test]
    fn synlab_scenario_end_to_end() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = pipeline(&registry, StubProvider::answering(CANNED));
        let doc = synlab_document(lab_pdf());

        let prepared = pipeline.prepare(&doc).unwrap();
        assert_eq!(prepared.profile_id, "synlab_lab");
        assert_eq!(prepared.extraction.strategy, StrategyKind::Table);
        assert!(prepared.extraction.score >= 0.6);
        assert!(prepared.extraction.table_count >= 1);

        let text = &prepared.redacted.text;
        assert!(text.contains("[CF]"));
        assert!(text.contains("[NOME]"));
        assert!(!text.contains("RSSMRA80A01H501U"));
        assert!(!text.contains("ROSSI"));
        assert!(text.contains("Glucosio | 95 mg/dL"));
        assert_eq!(prepared.redacted.integrity, IntegrityStatus::Verified);

        let report = pipeline.run(&[doc], &CancellationFlag::new());
        let entry = &report.entries[0];
        let analysis = entry.analysis.as_ref().unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Ok);
        assert_eq!(analysis.fields.as_ref().unwrap().summary, "Esami nella norma.");
        assert_eq!(entry.redaction_counts[FieldKind::FiscalCode.as_str()], 1);
        assert_eq!(report.failed().count(), 0);
    }

    #[test]
    fn two_column_header_is_redacted() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = pipeline(&registry, StubProvider::answering(CANNED));
        let pdf = make_positioned_pdf(&[&[
            (72.0, 760.0, "SYNLAB Italia - Referto di laboratorio"),
            (72.0, 740.0, "Paziente:"),
            (200.0, 740.0, "ROSSI MARIO"),
            (72.0, 726.0, "Data di nascita:"),
            (200.0, 726.0, "01/01/1980"),
            (72.0, 712.0, "Codice Fiscale:"),
            (200.0, 712.0, "RSSMRA80A01H501U"),
            (72.0, 686.0, "Glucosio"),
            (300.0, 686.0, "95 mg/dL"),
            (72.0, 672.0, "Colesterolo totale"),
            (300.0, 672.0, "180 mg/dL"),
            (72.0, 658.0, "Emoglobina"),
            (300.0, 658.0, "13,5 g/dL"),
        ]]);

        let prepared = pipeline.prepare(&synlab_document(pdf)).unwrap();
        assert_eq!(prepared.extraction.strategy, StrategyKind::Table);

        let text = &prepared.redacted.text;
        assert!(text.contains("[NOME]"), "{text}");
        assert!(text.contains("[DATA_NASCITA]"), "{text}");
        assert!(text.contains("[CF]"), "{text}");
        assert!(!text.contains("ROSSI"));
        assert!(!text.contains("MARIO"));
        assert!(!text.contains("1980"));
        assert!(!text.contains("RSSMRA80A01H501U"));
        assert_eq!(prepared.redacted.integrity, IntegrityStatus::Verified);
    }

    #[test]
    fn report_keeps_input_order_with_failures() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = pipeline(&registry, StubProvider::answering(CANNED));
        let missing = Document::from_path("/nonexistent/referto_ps.pdf", DocumentMetadata::default());
        let blank = Document::from_bytes("scan.pdf", make_blank_pdf(), DocumentMetadata::default());
        let docs = vec![synlab_document(lab_pdf()), missing, blank, synlab_document(lab_pdf())];

        let report = pipeline.run(&docs, &CancellationFlag::new());
        assert_eq!(report.len(), 4);
        for (entry, doc) in report.entries.iter().zip(&docs) {
            assert_eq!(entry.document_id, doc.id);
        }

        assert!(report.entries[0].analysis.as_ref().unwrap().is_ok());
        assert!(report.entries[1].error.is_some());
        assert_eq!(
            report.entries[1].analysis.as_ref().unwrap().failure,
            Some(FailureKind::Extraction)
        );
        assert!(report.entries[2].redacted.as_ref().unwrap().unprocessable);
        assert_eq!(
            report.entries[2].analysis.as_ref().unwrap().failure,
            Some(FailureKind::Extraction)
        );
        assert!(report.entries[3].analysis.as_ref().unwrap().is_ok());
        assert_eq!(report.failed().count(), 2);
    }

    #[test]
    fn redact_only_has_no_analysis() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = DocumentPipeline::new(
            &registry,
            LayoutExtractor::default(),
            Redactor::new(RedactionConfig::default()),
        );
        let report = pipeline.run(&[synlab_document(lab_pdf())], &CancellationFlag::new());
        assert!(report.entries[0].analysis.is_none());
        assert!(report.entries[0].redacted.is_some());
    }

    #[test]
    fn cancelled_run_reports_every_document() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = pipeline(&registry, StubProvider::answering(CANNED));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let docs = vec![synlab_document(lab_pdf()), synlab_document(lab_pdf())];

        let report = pipeline.run(&docs, &cancel);
        assert_eq!(report.len(), 2);
        for entry in &report.entries {
            let analysis = entry.analysis.as_ref().unwrap();
            assert_eq!(analysis.status, AnalysisStatus::Rejected);
            assert_eq!(analysis.failure, Some(FailureKind::Cancelled));
        }
    }

    #[test]
    fn report_serializes_without_literals() {
        let registry = ProfileRegistry::with_defaults().unwrap();
        let pipeline = pipeline(&registry, StubProvider::answering(CANNED));
        let report = pipeline.run(&[synlab_document(lab_pdf())], &CancellationFlag::new());
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("RSSMRA80A01H501U"));
        assert!(!json.contains("ROSSI"));
        assert!(json.contains("\"synlab_lab\""));
    }
}
