//! Fallback patterns applied to every document regardless of profile.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::enums::FieldKind;

/// A generic pattern; when the regex has a capture group, group 1 is the value.
pub struct GenericPattern {
    pub kind: FieldKind,
    pub name: &'static str,
    pub regex: Regex,
}

fn pattern(kind: FieldKind, name: &'static str, source: &str) -> GenericPattern {
    GenericPattern {
        kind,
        name,
        regex: Regex::new(source).unwrap(),
    }
}

/// Codice fiscale, including omocodia substitutions (digits replaced by LMNPQRSTUV).
const FISCAL_CODE: &str = r"(?i)\b[A-Z]{6}[0-9LMNPQRSTUV]{2}[A-EHLMPRST][0-9LMNPQRSTUV]{2}[A-Z][0-9LMNPQRSTUV]{3}[A-Z]\b";

const EMAIL: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

/// Mobile (3xx) and landline (0x...) numbers with optional +39 prefix.
/// Dots are not group separators: lab counts use them for thousands.
const PHONE: &str = r"(?:\+39[ -]?)?\b(?:3\d{2}|0\d{1,3})[ -]?\d{3,4}[ -]?\d{3,4}\b";

const BIRTH_DATE: &str = r"(?i)\b(?:nat[oa](?:/a)?[ \t]+il|data[ \t]+di[ \t]+nascita|data[ \t]+nascita|d\.[ \t]?n\.)[ \t]*:?[ \t]*(?:\|[ \t]*)?(\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4})";

const ANY_DATE: &str = r"\b\d{1,2}[/.-]\d{1,2}[/.-](?:\d{4}|\d{2})\b";

/// Street cue + capitalised name + civic number, optional CAP, city and province.
const ADDRESS: &str = concat!(
    r"\b(?:[Vv]ia|[Vv]iale|[Vv]\.le|[Pp]iazza|[Pp]iazzale|[Pp]\.za|[Cc]orso|[Cc]\.so|[Ll]argo|[Vv]icolo|[Ss]trada|[Ll]ocalità|[Ll]oc\.)",
    r"[ \t]+(?:(?:della|delle|degli|dello|del|dei|di|d')[ \t]*)?\p{Lu}[\p{L}'. ]{0,60}?,?[ \t]*\d{1,4}[A-Za-z]?(?:/\d{1,3})?\b",
    r"(?:[ \t]*[,-]?[ \t]*\d{5}(?:[ \t]+\p{Lu}[\p{L}']+(?:[ \t]+\p{Lu}[\p{L}']+)?)?)?",
    r"(?:[ \t]*\([A-Z]{2}\))?",
);

/// Administration routes that read like a street name after "via".
const ADMINISTRATION_ROUTES: &[&str] = &[
    "endovenosa",
    "orale",
    "intramuscolare",
    "sottocutanea",
    "sublinguale",
    "rettale",
    "topica",
    "inalatoria",
    "transdermica",
    "cutanea",
    "nasale",
    "oftalmica",
];

impl GenericPattern {
    /// Context checks the regex cannot express; `start..end` is the match
    /// inside `text`.
    pub fn accepts(&self, text: &str, start: usize, end: usize) -> bool {
        match self.kind {
            FieldKind::Phone => !continues_number(text, start, end),
            FieldKind::Address => !names_administration_route(&text[start..end]),
            _ => true,
        }
    }
}

/// A digit run glued to a decimal or thousands separator is a measurement.
fn continues_number(text: &str, start: usize, end: usize) -> bool {
    let mut after = text[end..].chars();
    let followed = matches!(
        (after.next(), after.next()),
        (Some('.' | ','), Some(d)) if d.is_ascii_digit()
    );
    let mut before = text[..start].chars().rev();
    let preceded = matches!(
        (before.next(), before.next()),
        (Some('.' | ','), Some(d)) if d.is_ascii_digit()
    );
    followed || preceded
}

fn names_administration_route(value: &str) -> bool {
    value
        .split_whitespace()
        .nth(1)
        .map(|word| word.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase())
        .is_some_and(|word| ADMINISTRATION_ROUTES.contains(&word.as_str()))
}

static ALWAYS: LazyLock<Vec<GenericPattern>> = LazyLock::new(|| {
    vec![
        pattern(FieldKind::FiscalCode, "fiscal_code", FISCAL_CODE),
        pattern(FieldKind::Email, "email", EMAIL),
        pattern(FieldKind::DateOfBirth, "birth_date", BIRTH_DATE),
        pattern(FieldKind::Address, "address", ADDRESS),
        pattern(FieldKind::Phone, "phone", PHONE),
    ]
});

static ALL_DATES: LazyLock<GenericPattern> =
    LazyLock::new(|| pattern(FieldKind::Other, "any_date", ANY_DATE));

/// Patterns to run, in priority order.
pub fn generic_patterns(redact_all_dates: bool) -> Vec<&'static GenericPattern> {
    let mut patterns: Vec<&'static GenericPattern> = ALWAYS.iter().collect();
    if redact_all_dates {
        patterns.push(&ALL_DATES);
    }
    patterns
}
