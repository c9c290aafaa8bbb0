/// Scoring weights and defaults for strategy selection.
pub mod thresholds {
    /// Default acceptability threshold: the first attempt at or above it wins.
    pub const DEFAULT_ACCEPTABILITY: f32 = 0.60;

    /// Non-whitespace ratio at which density saturates to 1.0.
    pub const DENSITY_SATURATION: f32 = 0.50;

    pub const DENSITY_WEIGHT: f32 = 0.40;
    pub const LEGIBILITY_WEIGHT: f32 = 0.30;
    pub const ANCHOR_WEIGHT: f32 = 0.30;
}

/// Breakdown of an extraction quality score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    pub density: f32,
    pub legibility: f32,
    /// `None` when the profile declares no anchors.
    pub anchors: Option<f32>,
    pub total: f32,
}

/// Score an extraction attempt in [0, 1].
///
/// `raw` is the strategy output as produced (for legibility, which must see
/// decoding garbage before sanitization removes it); `clean` is the
/// sanitized text downstream stages will receive.
pub fn score_extraction(raw: &str, clean: &str, anchors: &[String]) -> QualityScore {
    if clean.trim().is_empty() {
        return QualityScore {
            density: 0.0,
            legibility: 0.0,
            anchors: (!anchors.is_empty()).then_some(0.0),
            total: 0.0,
        };
    }

    let density = density_score(clean);
    let legibility = legibility_score(raw);
    let anchor = anchor_score(clean, anchors);

    let total = match anchor {
        Some(a) => {
            thresholds::DENSITY_WEIGHT * density
                + thresholds::LEGIBILITY_WEIGHT * legibility
                + thresholds::ANCHOR_WEIGHT * a
        }
        None => {
            let weight = thresholds::DENSITY_WEIGHT + thresholds::LEGIBILITY_WEIGHT;
            (thresholds::DENSITY_WEIGHT * density + thresholds::LEGIBILITY_WEIGHT * legibility)
                / weight
        }
    };

    QualityScore {
        density,
        legibility,
        anchors: anchor,
        total: total.clamp(0.0, 1.0),
    }
}

/// Non-whitespace share of all characters, saturating at `DENSITY_SATURATION`.
pub fn density_score(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let dense = text.chars().filter(|c| !c.is_whitespace()).count();
    let ratio = dense as f32 / total as f32;
    (ratio / thresholds::DENSITY_SATURATION).min(1.0)
}

/// Share of non-whitespace characters that decoded to something readable.
pub fn legibility_score(text: &str) -> f32 {
    let mut visible = 0usize;
    let mut legible = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if !is_garbage(c) {
            legible += 1;
        }
    }
    if visible == 0 {
        return 0.0;
    }
    legible as f32 / visible as f32
}

/// Fraction of anchors present (case-insensitive). `None` without anchors.
pub fn anchor_score(text: &str, anchors: &[String]) -> Option<f32> {
    let anchors: Vec<String> = anchors
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    if anchors.is_empty() {
        return None;
    }
    let haystack = text.to_lowercase();
    let hits = anchors.iter().filter(|a| haystack.contains(a.as_str())).count();
    Some(hits as f32 / anchors.len() as f32)
}

fn is_garbage(c: char) -> bool {
    c == '\u{FFFD}'
        || c.is_control()
        || matches!(c, '\u{E000}'..='\u{F8FF}')
        || matches!(c, '\u{F0000}'..='\u{FFFFD}')
        || matches!(c, '\u{100000}'..='\u{10FFFD}')
}
