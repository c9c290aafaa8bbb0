use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalogue::{CATALOGUE, COMMON_RULES};
use super::types::{
    FieldRule, FieldRuleSpec, Locator, LocatorSpec, Profile, ProfileQuery, ProfileSpec,
};
use super::ProfileError;
use crate::models::document::Document;
use crate::models::enums::DocumentType;

static GLOBAL: OnceLock<ProfileRegistry> = OnceLock::new();

/// Configuration-driven adjustments applied when the registry is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    /// Replacement anchor list, keyed by profile id.
    #[serde(default)]
    pub anchors: HashMap<String, Vec<String>>,
}

/// Read-only catalogue of document profiles.
///
/// Profiles are kept in priority order (facility+type, facility only,
/// type only); the catch-all default lives apart so resolution always
/// has an answer.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<Profile>,
    default: Profile,
}

impl ProfileRegistry {
    /// Build from the built-in catalogue.
    pub fn with_defaults() -> Result<Self, ProfileError> {
        Self::new(&ProfileOverrides::default())
    }

    pub fn new(overrides: &ProfileOverrides) -> Result<Self, ProfileError> {
        Self::from_specs(CATALOGUE, overrides)
    }

    pub fn from_specs(
        specs: &[ProfileSpec],
        overrides: &ProfileOverrides,
    ) -> Result<Self, ProfileError> {
        for id in overrides.anchors.keys() {
            if !specs.iter().any(|s| s.id == id) {
                return Err(ProfileError::UnknownProfile(id.clone()));
            }
        }

        let mut profiles = Vec::with_capacity(specs.len());
        let mut default = None;
        for spec in specs {
            let mut profile = compile_profile(spec)?;
            if let Some(anchors) = overrides.anchors.get(spec.id) {
                profile.anchors = anchors.clone();
            }
            if profile.is_default() {
                // First catch-all wins; later ones would never be reached.
                if default.is_none() {
                    default = Some(profile);
                }
            } else {
                profiles.push(profile);
            }
        }

        // Stable: catalogue order is preserved within a tier.
        profiles.sort_by_key(|p| p.tier);

        let default = default.ok_or(ProfileError::MissingDefault)?;
        tracing::debug!(
            profiles = profiles.len() + 1,
            anchor_overrides = overrides.anchors.len(),
            "Profile registry built"
        );
        Ok(Self { profiles, default })
    }

    /// Select the highest-priority profile whose predicate matches.
    /// Deterministic; falls back to the default profile.
    pub fn resolve(
        &self,
        facility_hint: Option<&str>,
        filename_tokens: &[String],
        document_type: Option<DocumentType>,
    ) -> &Profile {
        let query = ProfileQuery {
            facility_hint,
            filename_tokens,
            document_type,
        };
        self.profiles
            .iter()
            .find(|p| p.matches(&query))
            .unwrap_or(&self.default)
    }

    pub fn resolve_document(&self, document: &Document) -> &Profile {
        let profile = self.resolve(
            document.facility_hint.as_deref(),
            &document.filename_tokens,
            document.document_type_hint,
        );
        tracing::debug!(
            doc_id = %document.id,
            profile = profile.id,
            tier = ?profile.tier,
            "Profile resolved"
        );
        profile
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles().find(|p| p.id == id)
    }

    /// All profiles in priority order, default last.
    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter().chain(std::iter::once(&self.default))
    }

    pub fn default_profile(&self) -> &Profile {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.profiles.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Process-wide registry built from the built-in catalogue on first use.
pub fn global() -> Result<&'static ProfileRegistry, ProfileError> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }
    let registry = ProfileRegistry::with_defaults()?;
    Ok(GLOBAL.get_or_init(|| registry))
}

/// Install the process-wide registry with configuration overrides.
/// Must run before the first `global()` call.
pub fn init_global(overrides: &ProfileOverrides) -> Result<&'static ProfileRegistry, ProfileError> {
    let registry = ProfileRegistry::new(overrides)?;
    let mut installed = false;
    let current = GLOBAL.get_or_init(|| {
        installed = true;
        registry
    });
    if installed {
        Ok(current)
    } else {
        Err(ProfileError::AlreadyInitialized)
    }
}

fn compile_profile(spec: &ProfileSpec) -> Result<Profile, ProfileError> {
    let field_rules = spec
        .field_rules
        .iter()
        .chain(COMMON_RULES.iter())
        .map(|rule| compile_rule(spec.id, rule))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Profile {
        id: spec.id,
        display_name: spec.display_name,
        tier: spec.tier(),
        facility_patterns: spec
            .facility_patterns
            .iter()
            .map(|p| p.to_uppercase())
            .collect(),
        filename_tokens: spec.filename_tokens,
        document_type: spec.document_type,
        preferred_strategy: spec.preferred_strategy,
        anchors: spec.anchors.iter().map(|a| a.to_string()).collect(),
        field_rules,
        preserve_tables: spec.preserve_tables,
    })
}

fn compile_rule(profile: &str, rule: &FieldRuleSpec) -> Result<FieldRule, ProfileError> {
    let locator = match rule.locator {
        LocatorSpec::Label(label) => Locator::Label {
            label,
            regex: compile(profile, &label_pattern(label))?,
        },
        LocatorSpec::Pattern(pattern) => Locator::Pattern {
            regex: compile(profile, pattern)?,
        },
    };
    Ok(FieldRule {
        kind: rule.kind,
        locator,
    })
}

fn compile(profile: &str, pattern: &str) -> Result<Regex, ProfileError> {
    Regex::new(pattern).map_err(|e| ProfileError::InvalidRule {
        profile: profile.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Regex for "<label><sep><value>" where the separator is a colon, a tab,
/// a table cell boundary (`|`, optionally after a colon) or a run of 2+
/// spaces, and the value runs to the end of its cell (3+ spaces, tab, pipe
/// or end of line). Group 1 is the value.
pub fn label_pattern(label: &str) -> String {
    format!(
        r"(?im)(?:^|[^\p{{L}}]){}[ \t]*(?::[ \t]*(?:\|[ \t]*)?|\|[ \t]*|\t|[ \t]{{2,}})[ \t]*([^\n\t|]+?)(?:[ \t]{{3,}}|\t|[ \t]*\||[ \t]*$)",
        regex::escape(label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{FieldKind, StrategyKind};
    use crate::pipeline::profiles::types::MatchTier;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn registry() -> ProfileRegistry {
        ProfileRegistry::with_defaults().unwrap()
    }

    #[test]
    fn builtin_catalogue_compiles() {
        let reg = registry();
        assert_eq!(reg.len(), 16);
        assert!(reg.default_profile().is_default());
        assert_eq!(reg.default_profile().id, "default");
    }

    #[test]
    fn synlab_lab_selects_table_strategy() {
        let reg = registry();
        let profile = reg.resolve(Some("SYNLAB"), &[], Some(DocumentType::Laboratorio));
        assert_eq!(profile.id, "synlab_lab");
        assert_eq!(profile.preferred_strategy, StrategyKind::Table);
        assert!(profile.preserve_tables);
    }

    #[test]
    fn facility_hint_is_case_insensitive_substring() {
        let reg = registry();
        let profile = reg.resolve(
            Some("Synlab Italia S.r.l."),
            &[],
            Some(DocumentType::Laboratorio),
        );
        assert_eq!(profile.id, "synlab_lab");
    }

    #[test]
    fn facility_from_filename_token() {
        let reg = registry();
        let t = tokens(&["referto", "labs", "synlab"]);
        let profile = reg.resolve(None, &t, Some(DocumentType::Laboratorio));
        assert_eq!(profile.id, "synlab_lab");
    }

    #[test]
    fn facility_and_type_beats_facility_only_and_type_only() {
        let reg = registry();
        let profile = reg.resolve(Some("Niguarda"), &[], Some(DocumentType::ProntoSoccorso));
        assert_eq!(profile.id, "niguarda_ps");
        assert_eq!(profile.tier, MatchTier::FacilityAndType);
    }

    #[test]
    fn type_only_when_facility_unknown() {
        let reg = registry();
        let profile = reg.resolve(Some("Clinica Sconosciuta"), &[], Some(DocumentType::Dimissione));
        assert_eq!(profile.id, "dimosp");
        assert_eq!(profile.tier, MatchTier::TypeOnly);
    }

    #[test]
    fn facility_only_ignores_type() {
        let reg = registry();
        let profile = reg.resolve(Some("MultiMedica"), &[], Some(DocumentType::Laboratorio));
        assert_eq!(profile.id, "multimedica");
    }

    #[test]
    fn no_hints_gives_default() {
        let reg = registry();
        let profile = reg.resolve(None, &[], None);
        assert!(profile.is_default());
        assert_eq!(profile.preferred_strategy, StrategyKind::Simple);
    }

    #[test]
    fn type_mismatch_falls_through() {
        let reg = registry();
        // SYNLAB is only catalogued for lab reports
        let profile = reg.resolve(Some("SYNLAB"), &[], Some(DocumentType::Altro));
        assert!(profile.is_default());
    }

    #[test]
    fn resolution_is_deterministic() {
        let reg = registry();
        let t = tokens(&["policlinico", "ps"]);
        let first = reg.resolve(Some("Policlinico"), &t, Some(DocumentType::ProntoSoccorso)).id;
        for _ in 0..10 {
            let again = reg.resolve(Some("Policlinico"), &t, Some(DocumentType::ProntoSoccorso)).id;
            assert_eq!(first, again);
        }
        assert_eq!(first, "policlinico_ps");
    }

    #[test]
    fn resolve_document_uses_hints() {
        let reg = registry();
        let doc = Document::from_bytes(
            "referto_labs_synlab.pdf",
            Vec::new(),
            crate::models::document::DocumentMetadata::default(),
        );
        assert_eq!(reg.resolve_document(&doc).id, "synlab_lab");
    }

    #[test]
    fn common_rules_appended_after_specific() {
        let reg = registry();
        let profile = reg.get("synlab_lab").unwrap();
        let first_label = match profile.field_rules.first().map(|r| &r.locator) {
            Some(Locator::Label { label, .. }) => *label,
            _ => "",
        };
        assert_eq!(first_label, "Cod. Paziente");
        assert!(profile
            .field_rules
            .iter()
            .any(|r| r.kind == FieldKind::FiscalCode));
        assert_eq!(
            profile.field_rules.len(),
            3 + COMMON_RULES.len()
        );
    }

    #[test]
    fn anchor_override_replaces_list() {
        let mut overrides = ProfileOverrides::default();
        overrides
            .anchors
            .insert("lab".into(), vec!["Esito".into(), "Unità".into()]);
        let reg = ProfileRegistry::new(&overrides).unwrap();
        assert_eq!(reg.get("lab").unwrap().anchors, vec!["Esito", "Unità"]);
        assert_eq!(reg.get("synlab_lab").unwrap().anchors, vec!["SYNLAB"]);
    }

    #[test]
    fn anchor_override_for_unknown_profile_rejected() {
        let mut overrides = ProfileOverrides::default();
        overrides.anchors.insert("nope".into(), vec![]);
        assert_eq!(
            ProfileRegistry::new(&overrides).unwrap_err(),
            ProfileError::UnknownProfile("nope".into())
        );
    }

    #[test]
    fn invalid_pattern_reported_with_profile() {
        const BAD_RULES: &[FieldRuleSpec] = &[FieldRuleSpec::pattern(FieldKind::Name, "(unclosed")];
        let specs = [ProfileSpec {
            id: "broken",
            display_name: "Broken",
            facility_patterns: &["X"],
            filename_tokens: &[],
            document_type: None,
            preferred_strategy: StrategyKind::Simple,
            anchors: &[],
            field_rules: BAD_RULES,
            preserve_tables: false,
        }];
        let err = ProfileRegistry::from_specs(&specs, &ProfileOverrides::default()).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidRule { ref profile, .. } if profile == "broken"));
    }

    #[test]
    fn catalogue_without_default_rejected() {
        let specs: Vec<ProfileSpec> = CATALOGUE.iter().filter(|s| s.id != "default").copied().collect();
        assert_eq!(
            ProfileRegistry::from_specs(&specs, &ProfileOverrides::default()).unwrap_err(),
            ProfileError::MissingDefault
        );
    }

    #[test]
    fn label_pattern_requires_separator() {
        let re = Regex::new(&label_pattern("Paziente")).unwrap();
        let caps = re.captures("Paziente: ROSSI MARIO   Sesso: M").unwrap();
        assert_eq!(&caps[1], "ROSSI MARIO");
        assert!(re.captures("il Paziente riferisce dolore").is_none());
    }

    #[test]
    fn label_pattern_not_inside_longer_word() {
        let re = Regex::new(&label_pattern("Nome")).unwrap();
        assert!(re.captures("Cognome: ROSSI").is_none());
        assert_eq!(&re.captures("Nome: MARIO").unwrap()[1], "MARIO");
    }

    #[test]
    fn label_pattern_accepts_table_cells() {
        let re = Regex::new(&label_pattern("Paziente")).unwrap();
        assert_eq!(&re.captures("Paziente: | ROSSI MARIO").unwrap()[1], "ROSSI MARIO");
        assert_eq!(
            &re.captures("Paziente | BIANCHI ANNA | Sesso | F").unwrap()[1],
            "BIANCHI ANNA"
        );
    }

    #[test]
    fn global_registry_is_shared() {
        let a = global().unwrap();
        let b = global().unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(
            init_global(&ProfileOverrides::default()).unwrap_err(),
            ProfileError::AlreadyInitialized
        );
    }
}
