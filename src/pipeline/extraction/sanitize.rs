/// Sanitize extracted text before scoring and redaction.
/// Strips control and decoding-garbage characters, trims lines, drops blank
/// lines. Keeps the punctuation Italian reports rely on: units, reference
/// ranges, table separators and typographic quotes.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || is_report_punctuation(*c))
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_report_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '-'
            | '/'
            | '('
            | ')'
            | '['
            | ']'
            | '+'
            | '='
            | '%'
            | '#'
            | '@'
            | '&'
            | '\''
            | '"'
            | '!'
            | '?'
            | '<'
            | '>'
            | '*'
            | '_'
            | '|'
            | '^'
            | '°'
            | '²'
            | '³'
            | 'µ'
            | '±'
            | '≤'
            | '≥'
            | '↑'
            | '↓'
            | '«'
            | '»'
            | '€'
            | '\u{2013}' // en dash
            | '\u{2014}' // em dash
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201C}'
            | '\u{201D}'
    )
}
