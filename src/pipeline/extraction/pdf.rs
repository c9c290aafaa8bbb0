use super::types::{ExtractionStrategy, StrategyOutput};
use super::ExtractionError;
use crate::models::enums::StrategyKind;

/// Linear text extraction using the pdf-extract crate.
/// Reads the embedded text layer in content order and ignores layout.
pub struct SimpleStrategy;

impl ExtractionStrategy for SimpleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Simple
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let empty_pages = page_texts
            .iter()
            .enumerate()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(i, _)| i + 1)
            .collect();

        Ok(StrategyOutput {
            page_count: page_texts.len(),
            text: page_texts.join("\n"),
            tables: Vec::new(),
            empty_pages,
        })
    }
}
