use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confidence::{score_extraction, thresholds};
use super::pdf::SimpleStrategy;
use super::sanitize::sanitize_extracted_text;
use super::structured::StructuredStrategy;
use super::table_detect::TableStrategy;
use super::types::{
    ExtractionResult, ExtractionStrategy, ExtractionWarning, StrategyAttempt, StrategyOutput,
};
use super::ExtractionError;
use crate::models::document::{content_fingerprint, Document};
use crate::models::enums::StrategyKind;
use crate::pipeline::profiles::Profile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// First attempt scoring at or above this is accepted without trying others.
    pub acceptability_threshold: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            acceptability_threshold: thresholds::DEFAULT_ACCEPTABILITY,
        }
    }
}

/// Tries extraction strategies against one PDF and keeps the most reliable text.
pub struct LayoutExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy + Send + Sync>>,
    config: ExtractionConfig,
}

struct Candidate {
    strategy: StrategyKind,
    score: f32,
    output: StrategyOutput,
    clean: String,
}

impl LayoutExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self::with_strategies(
            config,
            vec![
                Box::new(SimpleStrategy),
                Box::new(StructuredStrategy),
                Box::new(TableStrategy),
            ],
        )
    }

    /// Custom strategy set (tests inject failing or canned strategies).
    pub fn with_strategies(
        config: ExtractionConfig,
        strategies: Vec<Box<dyn ExtractionStrategy + Send + Sync>>,
    ) -> Self {
        Self { strategies, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract a document's text. `Err` only when its bytes cannot be read;
    /// unparseable or image-only PDFs yield an unprocessable result.
    pub fn extract(
        &self,
        document: &Document,
        profile: &Profile,
    ) -> Result<ExtractionResult, ExtractionError> {
        let bytes = document.read_bytes()?;
        tracing::info!(
            doc_id = %document.id,
            fingerprint = %content_fingerprint(&bytes),
            profile = profile.id,
            preferred = %profile.preferred_strategy,
            "Starting layout extraction"
        );
        Ok(self.extract_bytes(document.id, &bytes, profile))
    }

    /// Attempt order: the profile's preferred strategy, then the rest in
    /// severity order.
    pub fn attempt_order(&self, profile: &Profile) -> Vec<StrategyKind> {
        let mut order = vec![profile.preferred_strategy];
        order.extend(
            StrategyKind::SEVERITY_ORDER
                .iter()
                .copied()
                .filter(|k| *k != profile.preferred_strategy),
        );
        order.retain(|k| self.strategy(*k).is_some());
        order
    }

    fn strategy(&self, kind: StrategyKind) -> Option<&(dyn ExtractionStrategy + Send + Sync)> {
        self.strategies
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }

    /// Evaluation loop: stop at the first acceptable score, else keep the
    /// best (ties go to the earlier attempt).
    pub fn extract_bytes(&self, document_id: Uuid, bytes: &[u8], profile: &Profile) -> ExtractionResult {
        let threshold = self.config.acceptability_threshold;
        let mut attempts = Vec::new();
        let mut warnings = Vec::new();
        let mut best: Option<Candidate> = None;

        for kind in self.attempt_order(profile) {
            let Some(strategy) = self.strategy(kind) else {
                continue;
            };

            let output = match strategy.extract(bytes) {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(
                        doc_id = %document_id,
                        strategy = %kind,
                        error = %e,
                        "Extraction strategy failed"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: kind,
                        score: 0.0,
                        failed: true,
                    });
                    warnings.push(ExtractionWarning::StrategyFailed {
                        strategy: kind,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let clean = sanitize_extracted_text(&output.text);
            let score = score_extraction(&output.text, &clean, &profile.anchors).total;
            tracing::debug!(
                doc_id = %document_id,
                strategy = %kind,
                score,
                chars = clean.len(),
                "Extraction attempt scored"
            );
            attempts.push(StrategyAttempt {
                strategy: kind,
                score,
                failed: false,
            });

            let better = best.as_ref().map_or(true, |b| score > b.score);
            if better {
                best = Some(Candidate {
                    strategy: kind,
                    score,
                    output,
                    clean,
                });
            }
            if score >= threshold {
                break;
            }
        }

        let Some(best) = best else {
            tracing::warn!(doc_id = %document_id, "No extraction strategy could parse the document");
            warnings.push(ExtractionWarning::NoTextLayer);
            return ExtractionResult {
                document_id,
                strategy: profile.preferred_strategy,
                text: String::new(),
                score: 0.0,
                page_count: 0,
                tables: Vec::new(),
                attempts,
                warnings,
            };
        };

        if best.clean.is_empty() {
            warnings.push(ExtractionWarning::NoTextLayer);
        } else if best.score < threshold {
            warnings.push(ExtractionWarning::BelowThreshold {
                best: best.score,
                threshold,
            });
        }
        if !best.output.empty_pages.is_empty() && !best.clean.is_empty() {
            warnings.push(ExtractionWarning::EmptyPages {
                pages: best.output.empty_pages.clone(),
            });
        }

        tracing::info!(
            doc_id = %document_id,
            strategy = %best.strategy,
            score = best.score,
            attempts = attempts.len(),
            pages = best.output.page_count,
            tables = best.output.tables.len(),
            "Layout extraction complete"
        );

        ExtractionResult {
            document_id,
            strategy: best.strategy,
            text: best.clean,
            score: best.score,
            page_count: best.output.page_count,
            tables: best.output.tables,
            attempts,
            warnings,
        }
    }
}

impl Default for LayoutExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}
