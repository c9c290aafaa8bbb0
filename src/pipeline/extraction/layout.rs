//! Positioned text runs from PDF content streams.
//!
//! Walks the text operators of each page with lopdf, tracking the text and
//! line matrices, and groups the resulting runs into baseline-aligned lines.
//! Glyph widths are estimated (no font metrics), which is enough to order
//! runs and to tell word gaps from column gaps.

use lopdf::content::Content;
use lopdf::{Document, Object};

use super::ExtractionError;

/// Average glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// TJ displacement (in font-size units) that counts as a word space.
const TJ_SPACE_THRESHOLD: f32 = 0.25;

/// Gap under this many glyph widths joins runs without a space.
const JOIN_GAP_GLYPHS: f32 = 0.3;

/// Upper bound on spaces inserted for a single gap.
const MAX_GAP_SPACES: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

impl TextRun {
    pub fn glyph_width(&self) -> f32 {
        (self.font_size * AVG_GLYPH_WIDTH).max(1.0)
    }

    pub fn end_x(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.glyph_width()
    }
}

/// Runs sharing a baseline, ordered left to right.
#[derive(Debug, Clone)]
pub struct PositionedLine {
    pub y: f32,
    pub runs: Vec<TextRun>,
}

impl PositionedLine {
    /// Render with spacing proportional to the horizontal gaps between runs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut prev: Option<&TextRun> = None;
        for run in &self.runs {
            if let Some(p) = prev {
                let glyph = p.glyph_width();
                let gap = run.x - p.end_x();
                if gap >= glyph * JOIN_GAP_GLYPHS {
                    let spaces = ((gap / glyph).round() as usize).clamp(1, MAX_GAP_SPACES);
                    out.extend(std::iter::repeat(' ').take(spaces));
                } else if !out.ends_with(' ') && !run.text.starts_with(' ') && gap > 0.0 {
                    out.push(' ');
                }
            }
            out.push_str(&run.text);
            prev = Some(run);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub number: usize,
    /// Top to bottom.
    pub lines: Vec<PositionedLine>,
}

/// Parse every page into positioned lines.
pub fn read_layout(pdf_bytes: &[u8]) -> Result<Vec<PageLayout>, ExtractionError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

    let mut pages = Vec::new();
    for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        let number = index + 1;
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| ExtractionError::PageContent {
                page: number,
                reason: e.to_string(),
            })?;
        let content = Content::decode(&raw).map_err(|e| ExtractionError::PageContent {
            page: number,
            reason: e.to_string(),
        })?;
        let runs = collect_runs(&content);
        pages.push(PageLayout {
            number,
            lines: group_lines(runs),
        });
    }
    Ok(pages)
}

/// Text state machine over one page's operators.
#[derive(Debug)]
struct TextState {
    /// Text matrix [a b c d e f].
    tm: [f32; 6],
    /// Line matrix, start of the current line.
    lm: [f32; 6],
    font_size: f32,
    leading: f32,
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl TextState {
    fn new() -> Self {
        Self {
            tm: IDENTITY,
            lm: IDENTITY,
            font_size: 12.0,
            leading: 0.0,
        }
    }

    fn begin_text(&mut self) {
        self.tm = IDENTITY;
        self.lm = IDENTITY;
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let [a, b, c, d, e, f] = self.lm;
        self.lm = [a, b, c, d, tx * a + ty * c + e, tx * b + ty * d + f];
        self.tm = self.lm;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    fn effective_size(&self) -> f32 {
        let scale = (self.tm[1] * self.tm[1] + self.tm[3] * self.tm[3]).sqrt();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        (self.font_size * scale).abs()
    }

    fn advance(&mut self, text_space: f32) {
        let dx = text_space * self.tm[0];
        let dy = text_space * self.tm[1];
        self.tm[4] += dx;
        self.tm[5] += dy;
    }

    fn emit(&mut self, text: String, runs: &mut Vec<TextRun>) {
        if text.is_empty() {
            return;
        }
        let size = self.effective_size();
        let chars = text.chars().count() as f32;
        runs.push(TextRun {
            x: self.tm[4],
            y: self.tm[5],
            font_size: size,
            text,
        });
        self.advance(chars * self.font_size * AVG_GLYPH_WIDTH);
    }
}

fn collect_runs(content: &Content) -> Vec<TextRun> {
    let mut state = TextState::new();
    let mut runs = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => state.begin_text(),
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "Tm" => {
                let values: Vec<f32> = operands.iter().filter_map(number).collect();
                if let &[a, b, c, d, e, f] = values.as_slice() {
                    state.tm = [a, b, c, d, e, f];
                    state.lm = state.tm;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.emit(text, &mut runs);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.emit(text, &mut runs);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    state.emit(text, &mut runs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    show_array(&mut state, items, &mut runs);
                }
            }
            _ => {}
        }
    }
    runs
}

/// TJ: strings interleaved with kerning adjustments in thousandths of an em.
/// Large negative adjustments are word spaces; the whole array is one run.
fn show_array(state: &mut TextState, items: &[Object], runs: &mut Vec<TextRun>) {
    let mut text = String::new();
    let start = state.tm;
    let mut advance = 0.0f32;

    for item in items {
        if let Some(s) = string_operand(item) {
            advance += s.chars().count() as f32 * state.font_size * AVG_GLYPH_WIDTH;
            text.push_str(&s);
        } else if let Some(adjust) = number(item) {
            let displacement = -adjust / 1000.0;
            advance += displacement * state.font_size;
            if displacement > TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
        }
    }

    if text.is_empty() {
        return;
    }
    runs.push(TextRun {
        x: start[4],
        y: start[5],
        font_size: state.effective_size(),
        text,
    });
    state.advance(advance);
}

fn operand(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(number)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// UTF-16BE when BOM-prefixed, otherwise single-byte (Latin-1 superset of
/// the WinAnsi letters Italian reports use).
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| winansi_char(b)).collect()
}

fn winansi_char(b: u8) -> char {
    match b {
        0x80 => '€',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        _ => b as char,
    }
}

/// Group runs into lines by baseline, top to bottom, each ordered by x.
pub fn group_lines(mut runs: Vec<TextRun>) -> Vec<PositionedLine> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<PositionedLine> = Vec::new();
    for run in runs {
        let tolerance = (run.font_size * 0.5).max(2.0);
        match lines.last_mut() {
            Some(line) if (line.y - run.y).abs() <= tolerance => line.runs.push(run),
            _ => lines.push(PositionedLine {
                y: run.y,
                runs: vec![run],
            }),
        }
    }
    for line in &mut lines {
        line.runs.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
}
