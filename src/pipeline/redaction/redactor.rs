use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use super::generic::generic_patterns;
use super::types::{FieldMatch, RedactedText, RedactionConfig};
use crate::models::enums::{FieldKind, IntegrityStatus, RuleLayer};
use crate::pipeline::extraction::ExtractionResult;
use crate::pipeline::profiles::{Locator, Profile};

/// Single characters are not propagated or checked.
const MIN_LITERAL_LEN: usize = 2;

/// Literals shorter than this are matched as whole words only.
pub const SUBSTRING_MATCH_LEN: usize = 3;

/// Cues that end a label value: the next field on the same line. Whole
/// words only, so names like NATALE or TELESCA are not cut.
static TERMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s(?:nat[oa]\b|nat\.|c\.f\.|cod\.\s?fisc|codice\s+fiscale\b|sesso\b|età\b|data\s+di\s+nascita\b|tel\b\.?|residente\b|indirizzo\b)",
    )
    .unwrap()
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:NOME|CF|INDIRIZZO|TELEFONO|DATA_NASCITA|EMAIL|DATO)\]").unwrap()
});

/// Profile-driven plus generic PII redaction for Italian medical reports.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    config: RedactionConfig,
}

impl Redactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RedactionConfig {
        &self.config
    }

    /// Every span that `redact` would replace, merged and ordered by offset.
    pub fn locate(&self, text: &str, profile: &Profile) -> Vec<FieldMatch> {
        merge_overlaps(text, &self.collect(text, profile))
    }

    /// Replace identifying spans with fixed placeholders and verify that no
    /// located literal survives.
    pub fn redact(&self, extraction: &ExtractionResult, profile: &Profile) -> RedactedText {
        let document_id = extraction.document_id;
        if extraction.is_unprocessable() {
            tracing::warn!(
                doc_id = %document_id,
                "Nothing to redact: document has no text layer"
            );
            return RedactedText {
                document_id,
                profile_id: profile.id.to_string(),
                document_type: profile.document_type,
                text: String::new(),
                records: Vec::new(),
                integrity: IntegrityStatus::Verified,
                strategy: extraction.strategy,
                extraction_score: extraction.score,
                unprocessable: true,
            };
        }

        let text = extraction.text.as_str();
        let found = self.collect(text, profile);
        let merged = merge_overlaps(text, &found);
        let redacted = substitute(text, &merged);
        let integrity = verify(document_id, &redacted, &found);

        let result = RedactedText {
            document_id,
            profile_id: profile.id.to_string(),
            document_type: profile.document_type,
            text: redacted,
            records: merged.iter().map(FieldMatch::record).collect(),
            integrity,
            strategy: extraction.strategy,
            extraction_score: extraction.score,
            unprocessable: false,
        };

        tracing::info!(
            doc_id = %document_id,
            profile = profile.id,
            spans = result.records.len(),
            by_kind = ?result.counts_by_kind(),
            integrity = %integrity,
            "Redaction complete"
        );
        result
    }

    /// Raw matches from all layers, before merging. Profile matches come
    /// first, then generic, then propagated copies.
    fn collect(&self, text: &str, profile: &Profile) -> Vec<FieldMatch> {
        let mut found = profile_matches(text, profile);

        let masked = mask(text, &found);
        for pattern in generic_patterns(self.config.redact_all_dates) {
            for caps in pattern.regex.captures_iter(&masked) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                let value = &text[m.start()..m.end()];
                if is_placeholder_only(value) || !pattern.accepts(text, m.start(), m.end()) {
                    continue;
                }
                found.push(FieldMatch::new(
                    pattern.kind,
                    m.start(),
                    m.end(),
                    value,
                    RuleLayer::Generic,
                ));
            }
        }

        let propagated = propagate(text, &found);
        found.extend(propagated);
        found
    }
}

fn profile_matches(text: &str, profile: &Profile) -> Vec<FieldMatch> {
    let mut found = Vec::new();
    for rule in &profile.field_rules {
        let regex = match &rule.locator {
            Locator::Label { regex, .. } | Locator::Pattern { regex } => regex,
        };
        let is_label = matches!(rule.locator, Locator::Label { .. });

        for caps in regex.captures_iter(text) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let span = if is_label {
                label_value_span(text, m.start(), m.end())
            } else {
                trim_span(text, m.start(), m.end())
            };
            let Some((start, end)) = span else {
                continue;
            };
            let value = &text[start..end];
            if is_placeholder_only(value) {
                continue;
            }
            found.push(FieldMatch::new(rule.kind, start, end, value, RuleLayer::Profile));
        }
    }
    found
}

/// Cut a label value at the first terminator cue, then trim whitespace and
/// trailing separators.
fn label_value_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let cut = TERMINATOR
        .find(&text[start..end])
        .map_or(end - start, |m| m.start());
    trim_span(text, start, start + cut)
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let value = &text[start..end];
    let lead = value.len() - value.trim_start().len();
    let trimmed =
        value.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '-'));
    let (s, e) = (start + lead, start + trimmed.len());
    (s < e).then_some((s, e))
}

fn is_placeholder_only(value: &str) -> bool {
    PLACEHOLDER
        .replace_all(value, "")
        .chars()
        .all(|c| !c.is_alphanumeric())
}

/// Same-length copy of `text` with matched spans overwritten by `#`, so
/// later layers keep valid offsets but cannot re-match profile values.
fn mask(text: &str, matches: &[FieldMatch]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for m in matches {
        bytes[m.start..m.end].fill(b'#');
    }
    // Spans sit on char boundaries, so the masked bytes stay valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Every other case-insensitive occurrence of a located literal.
fn propagate(text: &str, found: &[FieldMatch]) -> Vec<FieldMatch> {
    let mut seen: BTreeMap<String, FieldKind> = BTreeMap::new();
    for m in found {
        let key = m.literal.trim().to_lowercase();
        if key.chars().count() >= MIN_LITERAL_LEN {
            seen.entry(key).or_insert(m.kind);
        }
    }

    let mut extra = Vec::new();
    for (literal, kind) in &seen {
        let Some(regex) = literal_regex(literal) else {
            continue;
        };
        for occ in regex.find_iter(text) {
            let already = found
                .iter()
                .any(|m| m.start <= occ.start() && occ.end() <= m.end);
            if !already {
                extra.push(FieldMatch::new(
                    *kind,
                    occ.start(),
                    occ.end(),
                    occ.as_str(),
                    RuleLayer::Propagated,
                ));
            }
        }
    }
    extra
}

/// Case-insensitive matcher for a located literal; short ones match whole
/// words only.
fn literal_regex(literal: &str) -> Option<Regex> {
    let escaped = regex::escape(literal);
    let pattern = if literal.chars().count() < SUBSTRING_MATCH_LEN {
        format!(r"\b{escaped}\b")
    } else {
        escaped
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Merge overlapping spans; the earlier span's kind and layer win.
fn merge_overlaps(text: &str, found: &[FieldMatch]) -> Vec<FieldMatch> {
    let mut order: Vec<&FieldMatch> = found.iter().collect();
    // Stable: profile matches stay ahead of generic ones at the same offset.
    order.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut spans: Vec<(usize, usize, FieldKind, RuleLayer)> = Vec::new();
    for m in order {
        match spans.last_mut() {
            Some(last) if m.start < last.1 => last.1 = last.1.max(m.end),
            _ => spans.push((m.start, m.end, m.kind, m.layer)),
        }
    }

    spans
        .into_iter()
        .map(|(start, end, kind, layer)| FieldMatch::new(kind, start, end, &text[start..end], layer))
        .collect()
}

fn substitute(text: &str, merged: &[FieldMatch]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in merged {
        out.push_str(&text[cursor..m.start]);
        out.push_str(m.kind.placeholder());
        cursor = m.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Re-scan the output for every located literal.
fn verify(document_id: uuid::Uuid, redacted: &str, found: &[FieldMatch]) -> IntegrityStatus {
    let placeholders: Vec<(usize, usize)> = PLACEHOLDER
        .find_iter(redacted)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut survivors: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut checked: Vec<String> = Vec::new();
    for m in found {
        let key = m.literal.trim().to_lowercase();
        if key.chars().count() < MIN_LITERAL_LEN || checked.contains(&key) {
            continue;
        }
        let Some(regex) = literal_regex(&key) else {
            continue;
        };
        let count = regex
            .find_iter(redacted)
            .filter(|occ| {
                !placeholders
                    .iter()
                    .any(|&(s, e)| occ.start() < e && s < occ.end())
            })
            .count();
        if count > 0 {
            *survivors.entry(m.kind.as_str()).or_insert(0) += count;
        }
        checked.push(key);
    }

    if survivors.is_empty() {
        return IntegrityStatus::Verified;
    }
    for (kind, count) in &survivors {
        tracing::error!(
            doc_id = %document_id,
            kind = *kind,
            occurrences = count,
            "Redaction integrity violated: located value survives in output"
        );
    }
    IntegrityStatus::Violated
}
