use super::layout::{read_layout, PageLayout, PositionedLine, TextRun};
use super::types::{ExtractionStrategy, StrategyOutput, TableRegion};
use super::ExtractionError;
use crate::models::enums::StrategyKind;

/// Minimum consecutive aligned lines to call a block a table.
const MIN_TABLE_ROWS: usize = 3;

/// Minimum shared column starts between adjacent rows.
const MIN_SHARED_COLUMNS: usize = 2;

/// Horizontal slack when comparing column starts (points).
const COLUMN_TOLERANCE: f32 = 6.0;

/// Gap between runs, in glyph widths, that separates cells rather than words.
const CELL_GAP_GLYPHS: f32 = 2.0;

/// Table-aware extraction: positioned lines, with column-aligned blocks
/// serialised cell by cell as `a | b | c`.
pub struct TableStrategy;

impl ExtractionStrategy for TableStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Table
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        let pages = read_layout(pdf_bytes)?;
        Ok(serialize_pages(&pages))
    }
}

/// A cell: text plus the x where it starts.
#[derive(Debug, Clone, PartialEq)]
struct Cell {
    x: f32,
    text: String,
}

fn serialize_pages(pages: &[PageLayout]) -> StrategyOutput {
    let mut out_lines: Vec<String> = Vec::new();
    let mut tables = Vec::new();
    let mut empty_pages = Vec::new();

    for page in pages {
        if page.lines.is_empty() {
            empty_pages.push(page.number);
            continue;
        }
        let cells: Vec<Vec<Cell>> = page.lines.iter().map(split_cells).collect();
        let regions = detect_regions(&cells);

        let mut next_region = regions.iter().peekable();
        let mut i = 0;
        while i < page.lines.len() {
            match next_region.peek() {
                Some(&&(start, end)) if start == i => {
                    let first_line = out_lines.len();
                    let mut column_count = 0;
                    for row in &cells[start..=end] {
                        column_count = column_count.max(row.len());
                        out_lines.push(
                            row.iter()
                                .map(|c| c.text.as_str())
                                .collect::<Vec<_>>()
                                .join(" | "),
                        );
                    }
                    tables.push(TableRegion {
                        page: page.number,
                        first_line,
                        last_line: out_lines.len() - 1,
                        column_count,
                    });
                    next_region.next();
                    i = end + 1;
                }
                _ => {
                    out_lines.push(page.lines[i].render());
                    i += 1;
                }
            }
        }
    }

    StrategyOutput {
        text: out_lines.join("\n"),
        page_count: pages.len(),
        tables,
        empty_pages,
    }
}

/// Split a positioned line into cells. Runs closer than a cell gap merge into
/// one cell; a single run whose text is itself space-aligned is split on its
/// multi-space gaps, with x estimated from character offsets.
fn split_cells(line: &PositionedLine) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();
    let mut prev: Option<&TextRun> = None;

    for run in &line.runs {
        let joins = prev.is_some_and(|p| run.x - p.end_x() < p.glyph_width() * CELL_GAP_GLYPHS);
        match cells.last_mut() {
            Some(cell) if joins => {
                if !cell.text.ends_with(' ') && !run.text.starts_with(' ') {
                    cell.text.push(' ');
                }
                cell.text.push_str(&run.text);
            }
            _ => cells.extend(split_aligned_run(run)),
        }
        prev = Some(run);
    }

    for cell in &mut cells {
        cell.text = cell.text.trim().to_string();
    }
    cells.retain(|c| !c.text.is_empty());
    cells
}

fn split_aligned_run(run: &TextRun) -> Vec<Cell> {
    if !is_tabular_line(&run.text) {
        return vec![Cell {
            x: run.x,
            text: run.text.clone(),
        }];
    }

    let glyph = run.glyph_width();
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut start_col = 0usize;
    let mut spaces = 0usize;

    for (col, ch) in run.text.chars().enumerate() {
        if ch == ' ' {
            spaces += 1;
            continue;
        }
        if spaces >= 3 && !current.is_empty() {
            cells.push(Cell {
                x: run.x + start_col as f32 * glyph,
                text: std::mem::take(&mut current),
            });
        } else if spaces > 0 && !current.is_empty() {
            current.extend(std::iter::repeat(' ').take(spaces));
        }
        if current.is_empty() {
            start_col = col;
        }
        current.push(ch);
        spaces = 0;
    }
    if !current.is_empty() {
        cells.push(Cell {
            x: run.x + start_col as f32 * glyph,
            text: current,
        });
    }
    cells
}

/// Inclusive (start, end) line ranges of column-aligned blocks.
fn detect_regions(rows: &[Vec<Cell>]) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut start: Option<usize> = None;

    for i in 1..=rows.len() {
        let aligned = i < rows.len() && rows_aligned(&rows[i - 1], &rows[i]);
        match (aligned, start) {
            (true, None) => start = Some(i - 1),
            (false, Some(s)) => {
                if i - s >= MIN_TABLE_ROWS {
                    regions.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    regions
}

fn rows_aligned(a: &[Cell], b: &[Cell]) -> bool {
    if a.len() < MIN_SHARED_COLUMNS || b.len() < MIN_SHARED_COLUMNS {
        return false;
    }
    let shared = a
        .iter()
        .filter(|ca| b.iter().any(|cb| (ca.x - cb.x).abs() <= COLUMN_TOLERANCE))
        .count();
    shared >= MIN_SHARED_COLUMNS
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// Patterns detected:
/// - Tab-separated: "Glucosio\t95\tmg/dL"
/// - Pipe-separated: "Glucosio | 95 | mg/dL"
/// - Multi-space aligned: "Glucosio    95    mg/dL"
pub fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() < 5 {
        return false;
    }

    if trimmed.matches('\t').count() >= 2 {
        return true;
    }

    if trimmed.matches('|').count() >= 2 {
        return true;
    }

    count_multi_space_gaps(trimmed) >= 2
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut in_gap = false;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len >= 3 && !in_gap {
                in_gap = true;
                count += 1;
            }
        } else {
            in_gap = false;
            gap_len = 0;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::pdf::test_pdf::*;

    fn cell(x: f32, text: &str) -> Cell {
        Cell {
            x,
            text: text.to_string(),
        }
    }

    fn lab_pdf() -> Vec<u8> {
        make_positioned_pdf(&[&[
            (72.0, 760.0, "SYNLAB Italia - Referto di laboratorio"),
            (72.0, 740.0, "Codice Fiscale: RSSMRA80A01H501U"),
            (72.0, 710.0, "Esame"),
            (300.0, 710.0, "Risultato"),
            (72.0, 696.0, "Glucosio"),
            (300.0, 696.0, "95 mg/dL"),
            (72.0, 682.0, "Colesterolo totale"),
            (300.0, 682.0, "180 mg/dL"),
            (72.0, 668.0, "Emoglobina"),
            (300.0, 668.0, "13,5 g/dL"),
            (72.0, 640.0, "Valori di riferimento secondo linee guida"),
        ]])
    }

    #[test]
    fn two_column_lab_table_serialised() {
        let out = TableStrategy.extract(&lab_pdf()).unwrap();
        let lines: Vec<&str> = out.text.lines().collect();

        assert_eq!(lines[2], "Esame | Risultato");
        assert_eq!(lines[3], "Glucosio | 95 mg/dL");
        assert_eq!(lines[4], "Colesterolo totale | 180 mg/dL");
        assert_eq!(lines[5], "Emoglobina | 13,5 g/dL");
        assert_eq!(
            out.tables,
            vec![TableRegion {
                page: 1,
                first_line: 2,
                last_line: 5,
                column_count: 2,
            }]
        );
        assert!(lines[1].starts_with("Codice Fiscale"));
    }

    #[test]
    fn two_aligned_rows_are_not_a_table() {
        let rows = vec![
            vec![cell(72.0, "A"), cell(300.0, "1")],
            vec![cell(72.0, "B"), cell(300.0, "2")],
            vec![cell(72.0, "prosa libera")],
        ];
        assert!(detect_regions(&rows).is_empty());
    }

    #[test]
    fn region_at_end_of_page_detected() {
        let rows = vec![
            vec![cell(72.0, "titolo")],
            vec![cell(72.0, "A"), cell(300.0, "1")],
            vec![cell(72.0, "B"), cell(301.0, "2")],
            vec![cell(73.0, "C"), cell(300.0, "3")],
        ];
        assert_eq!(detect_regions(&rows), vec![(1, 3)]);
    }

    #[test]
    fn misaligned_columns_break_region() {
        let a = vec![cell(72.0, "A"), cell(300.0, "1")];
        let b = vec![cell(72.0, "B"), cell(400.0, "2")];
        assert!(!rows_aligned(&a, &b));
    }

    #[test]
    fn space_aligned_run_split_into_cells() {
        let run = TextRun {
            x: 72.0,
            y: 700.0,
            font_size: 10.0,
            text: "Glucosio    95 mg/dL    70 - 110".to_string(),
        };
        let cells = split_aligned_run(&run);
        let texts: Vec<&str> = cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Glucosio", "95 mg/dL", "70 - 110"]);
        assert_eq!(cells[1].x, 72.0 + 12.0 * 5.0);
    }

    #[test]
    fn nearby_runs_merge_into_one_cell() {
        let line = PositionedLine {
            y: 700.0,
            runs: vec![
                TextRun {
                    x: 72.0,
                    y: 700.0,
                    font_size: 10.0,
                    text: "Colesterolo".into(),
                },
                TextRun {
                    x: 130.0,
                    y: 700.0,
                    font_size: 10.0,
                    text: "HDL".into(),
                },
            ],
        };
        let cells = split_cells(&line);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].text, "Colesterolo HDL");
    }

    // --- is_tabular_line ---

    #[test]
    fn tab_and_pipe_separated_are_tabular() {
        assert!(is_tabular_line("Glucosio\t95\tmg/dL"));
        assert!(is_tabular_line("| K | 4,2 | mmol/L |"));
    }

    #[test]
    fn multi_space_is_tabular() {
        assert!(is_tabular_line("Sodio       140    mmol/L    136-145"));
    }

    #[test]
    fn prose_not_tabular() {
        assert!(!is_tabular_line("Il paziente riferisce dolore toracico."));
        assert!(!is_tabular_line("Hi"));
        assert!(!is_tabular_line(""));
    }

    #[test]
    fn counts_gaps() {
        assert_eq!(count_multi_space_gaps("A   B   C"), 2);
        assert_eq!(count_multi_space_gaps("Hello   World"), 1);
        assert_eq!(count_multi_space_gaps("Hello World"), 0);
    }
}
