use super::layout::{read_layout, PageLayout};
use super::types::{ExtractionStrategy, StrategyOutput};
use super::ExtractionError;
use crate::models::enums::StrategyKind;

/// Layout-aware reconstruction: lines rebuilt from positioned runs, with
/// horizontal gaps kept as proportional spacing so label/value columns stay
/// apart.
pub struct StructuredStrategy;

impl ExtractionStrategy for StructuredStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structured
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        let pages = read_layout(pdf_bytes)?;
        Ok(render_pages(&pages))
    }
}

pub(crate) fn render_pages(pages: &[PageLayout]) -> StrategyOutput {
    let mut lines = Vec::new();
    let mut empty_pages = Vec::new();
    for page in pages {
        if page.lines.is_empty() {
            empty_pages.push(page.number);
        }
        lines.extend(page.lines.iter().map(|l| l.render()));
    }
    StrategyOutput {
        text: lines.join("\n"),
        page_count: pages.len(),
        tables: Vec::new(),
        empty_pages,
    }
}
