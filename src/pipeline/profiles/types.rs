use regex::Regex;

use crate::models::enums::{DocumentType, FieldKind, StrategyKind};

/// How a profile rule finds the value to redact.
#[derive(Debug, Clone, Copy)]
pub enum LocatorSpec {
    /// Value follows a literal label ("Paziente:") up to the end of its cell.
    Label(&'static str),
    /// Regex; capture group 1 (or the whole match) is the value.
    Pattern(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRuleSpec {
    pub kind: FieldKind,
    pub locator: LocatorSpec,
}

impl FieldRuleSpec {
    pub const fn label(kind: FieldKind, label: &'static str) -> Self {
        Self {
            kind,
            locator: LocatorSpec::Label(label),
        }
    }

    pub const fn pattern(kind: FieldKind, pattern: &'static str) -> Self {
        Self {
            kind,
            locator: LocatorSpec::Pattern(pattern),
        }
    }
}

/// One catalogue record. New institutions are added by appending a record.
#[derive(Debug, Clone, Copy)]
pub struct ProfileSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Matched case-insensitively as substrings of the facility hint.
    pub facility_patterns: &'static [&'static str],
    /// Matched against lowercase filename tokens.
    pub filename_tokens: &'static [&'static str],
    pub document_type: Option<DocumentType>,
    pub preferred_strategy: StrategyKind,
    pub anchors: &'static [&'static str],
    pub field_rules: &'static [FieldRuleSpec],
    pub preserve_tables: bool,
}

/// Priority tier, derived from which predicates a profile declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    FacilityAndType,
    FacilityOnly,
    TypeOnly,
    Default,
}

impl ProfileSpec {
    pub fn tier(&self) -> MatchTier {
        let has_facility = !self.facility_patterns.is_empty() || !self.filename_tokens.is_empty();
        match (has_facility, self.document_type.is_some()) {
            (true, true) => MatchTier::FacilityAndType,
            (true, false) => MatchTier::FacilityOnly,
            (false, true) => MatchTier::TypeOnly,
            (false, false) => MatchTier::Default,
        }
    }
}

/// Compiled locator.
#[derive(Debug, Clone)]
pub enum Locator {
    Label { label: &'static str, regex: Regex },
    Pattern { regex: Regex },
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub locator: Locator,
}

/// A resolved document profile: classification predicate, extraction
/// preference and redaction rules. Read-only after registry initialization.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub tier: MatchTier,
    pub facility_patterns: Vec<String>,
    pub filename_tokens: &'static [&'static str],
    pub document_type: Option<DocumentType>,
    pub preferred_strategy: StrategyKind,
    pub anchors: Vec<String>,
    pub field_rules: Vec<FieldRule>,
    pub preserve_tables: bool,
}

/// Matching inputs for `ProfileRegistry::resolve`.
#[derive(Debug, Clone, Copy)]
pub struct ProfileQuery<'a> {
    pub facility_hint: Option<&'a str>,
    pub filename_tokens: &'a [String],
    pub document_type: Option<DocumentType>,
}

impl Profile {
    fn facility_matches(&self, query: &ProfileQuery<'_>) -> bool {
        let by_hint = query.facility_hint.is_some_and(|hint| {
            let upper = hint.to_uppercase();
            self.facility_patterns.iter().any(|p| upper.contains(p.as_str()))
        });
        let by_token = query
            .filename_tokens
            .iter()
            .any(|t| self.filename_tokens.contains(&t.as_str()));
        by_hint || by_token
    }

    fn type_matches(&self, query: &ProfileQuery<'_>) -> bool {
        match self.document_type {
            Some(expected) => query.document_type == Some(expected),
            None => true,
        }
    }

    /// Whether this profile's predicate accepts the query.
    pub fn matches(&self, query: &ProfileQuery<'_>) -> bool {
        match self.tier {
            MatchTier::FacilityAndType => self.facility_matches(query) && self.type_matches(query),
            MatchTier::FacilityOnly => self.facility_matches(query),
            MatchTier::TypeOnly => self.type_matches(query),
            MatchTier::Default => true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.tier == MatchTier::Default
    }
}
