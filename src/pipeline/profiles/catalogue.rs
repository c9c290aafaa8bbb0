//! Static profile catalogue, in priority order.
//!
//! Each record is data: facility/type predicate, preferred extraction
//! strategy, anchor tokens and profile-specific redaction rules. The
//! registry appends `COMMON_RULES` after every profile's own rules.

use super::types::{FieldRuleSpec, ProfileSpec};
use crate::models::enums::{DocumentType, FieldKind, StrategyKind};

use FieldKind::{Address, DateOfBirth, Email, FiscalCode, Name, Other, Phone};

/// Labels shared by every Italian report layout seen so far.
pub const COMMON_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Cognome e Nome"),
    FieldRuleSpec::label(Name, "Nome e Cognome"),
    FieldRuleSpec::label(Name, "Paziente"),
    FieldRuleSpec::label(Name, "Assistito"),
    FieldRuleSpec::label(Name, "Cognome"),
    FieldRuleSpec::label(Name, "Nome"),
    FieldRuleSpec::pattern(
        Name,
        r"\b(?:Sig\.ra|Sig\.|Sig)[ \t]+(\p{Lu}[\p{L}']+(?:[ \t]+\p{Lu}[\p{L}']+){1,2})",
    ),
    FieldRuleSpec::label(FiscalCode, "Codice Fiscale"),
    FieldRuleSpec::label(FiscalCode, "Cod. Fiscale"),
    FieldRuleSpec::label(FiscalCode, "C.F."),
    FieldRuleSpec::label(DateOfBirth, "Data di nascita"),
    FieldRuleSpec::label(DateOfBirth, "Data nascita"),
    FieldRuleSpec::label(DateOfBirth, "Nato il"),
    FieldRuleSpec::label(DateOfBirth, "Nata il"),
    FieldRuleSpec::label(Address, "Indirizzo"),
    FieldRuleSpec::label(Address, "Residenza"),
    FieldRuleSpec::label(Address, "Domicilio"),
    FieldRuleSpec::label(Phone, "Telefono"),
    FieldRuleSpec::label(Phone, "Cellulare"),
    FieldRuleSpec::label(Phone, "Tel."),
    FieldRuleSpec::label(Email, "E-mail"),
    FieldRuleSpec::label(Email, "Email"),
    FieldRuleSpec::label(Other, "Tessera sanitaria"),
    FieldRuleSpec::label(Other, "N. Tessera"),
];

const SYNLAB_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Other, "Cod. Paziente"),
    FieldRuleSpec::label(Other, "ID Paziente"),
    FieldRuleSpec::label(Other, "Accettazione"),
];

const CDI_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Nominativo"),
    FieldRuleSpec::label(Other, "Codice accettazione"),
];

const LIFEBRAIN_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Nominativo"),
    FieldRuleSpec::label(Other, "N. Richiesta"),
];

const POLICLINICO_LAB_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Cognome Nome"),
    FieldRuleSpec::label(Other, "N. Campione"),
];

const PS_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Accompagnatore"),
    FieldRuleSpec::label(Other, "Codice Nosologico"),
    FieldRuleSpec::label(Phone, "Recapito"),
];

const DIMISSIONE_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Degente"),
    FieldRuleSpec::label(Other, "Nosologico"),
    FieldRuleSpec::pattern(
        Name,
        r"\b(?:il|la|il/la)[ \t]+paziente[ \t]+(\p{Lu}[\p{L}']+(?:[ \t]+\p{Lu}[\p{L}']+){1,2})",
    ),
];

const HUMANITAS_RULES: &[FieldRuleSpec] = &[
    FieldRuleSpec::label(Name, "Nominativo"),
    FieldRuleSpec::label(Other, "Cod. Prenotazione"),
];

const SANTAGOSTINO_RULES: &[FieldRuleSpec] = &[FieldRuleSpec::label(Name, "Cliente")];

const MULTIMEDICA_RULES: &[FieldRuleSpec] = &[FieldRuleSpec::label(Name, "Intestatario")];

pub const CATALOGUE: &[ProfileSpec] = &[
    // ── facility + type ──────────────────────────────────────
    ProfileSpec {
        id: "synlab_lab",
        display_name: "SYNLAB (referto di laboratorio)",
        facility_patterns: &["SYNLAB"],
        filename_tokens: &["synlab"],
        document_type: Some(DocumentType::Laboratorio),
        preferred_strategy: StrategyKind::Table,
        anchors: &["SYNLAB"],
        field_rules: SYNLAB_RULES,
        preserve_tables: true,
    },
    ProfileSpec {
        id: "cdi_lab",
        display_name: "Centro Diagnostico Italiano (laboratorio)",
        facility_patterns: &["CENTRO DIAGNOSTICO ITALIANO", "CDI"],
        filename_tokens: &["cdi"],
        document_type: Some(DocumentType::Laboratorio),
        preferred_strategy: StrategyKind::Table,
        anchors: &["Centro Diagnostico Italiano"],
        field_rules: CDI_RULES,
        preserve_tables: true,
    },
    ProfileSpec {
        id: "lifebrain_lab",
        display_name: "Lifebrain (laboratorio)",
        facility_patterns: &["LIFEBRAIN"],
        filename_tokens: &["lifebrain"],
        document_type: Some(DocumentType::Laboratorio),
        preferred_strategy: StrategyKind::Table,
        anchors: &["Lifebrain"],
        field_rules: LIFEBRAIN_RULES,
        preserve_tables: true,
    },
    ProfileSpec {
        id: "policlinico_lab",
        display_name: "Policlinico di Milano (laboratorio)",
        facility_patterns: &["POLICLINICO"],
        filename_tokens: &["policlinico"],
        document_type: Some(DocumentType::Laboratorio),
        preferred_strategy: StrategyKind::Table,
        anchors: &["Policlinico", "Laboratorio"],
        field_rules: POLICLINICO_LAB_RULES,
        preserve_tables: true,
    },
    ProfileSpec {
        id: "policlinico_ps",
        display_name: "Policlinico di Milano (pronto soccorso)",
        facility_patterns: &["POLICLINICO"],
        filename_tokens: &["policlinico"],
        document_type: Some(DocumentType::ProntoSoccorso),
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Policlinico", "Pronto Soccorso"],
        field_rules: PS_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "niguarda_ps",
        display_name: "ASST Niguarda (pronto soccorso)",
        facility_patterns: &["NIGUARDA"],
        filename_tokens: &["niguarda"],
        document_type: Some(DocumentType::ProntoSoccorso),
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Niguarda", "Pronto Soccorso"],
        field_rules: PS_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "niguarda_dimosp",
        display_name: "ASST Niguarda (lettera di dimissione)",
        facility_patterns: &["NIGUARDA"],
        filename_tokens: &["niguarda"],
        document_type: Some(DocumentType::Dimissione),
        preferred_strategy: StrategyKind::Simple,
        anchors: &["Niguarda", "dimissione"],
        field_rules: DIMISSIONE_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "sanraffaele_dimosp",
        display_name: "Ospedale San Raffaele (lettera di dimissione)",
        facility_patterns: &["SAN RAFFAELE", "HSR"],
        filename_tokens: &["sanraffaele", "hsr"],
        document_type: Some(DocumentType::Dimissione),
        preferred_strategy: StrategyKind::Simple,
        anchors: &["San Raffaele", "dimissione"],
        field_rules: DIMISSIONE_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "humanitas_spec",
        display_name: "Humanitas (referto specialistico)",
        facility_patterns: &["HUMANITAS"],
        filename_tokens: &["humanitas"],
        document_type: Some(DocumentType::Specialistica),
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Humanitas", "Referto"],
        field_rules: HUMANITAS_RULES,
        preserve_tables: false,
    },
    // ── facility only ────────────────────────────────────────
    ProfileSpec {
        id: "santagostino",
        display_name: "Centro Medico Santagostino",
        facility_patterns: &["SANTAGOSTINO"],
        filename_tokens: &["santagostino"],
        document_type: None,
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Santagostino"],
        field_rules: SANTAGOSTINO_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "multimedica",
        display_name: "MultiMedica",
        facility_patterns: &["MULTIMEDICA"],
        filename_tokens: &["multimedica"],
        document_type: None,
        preferred_strategy: StrategyKind::Structured,
        anchors: &["MultiMedica"],
        field_rules: MULTIMEDICA_RULES,
        preserve_tables: false,
    },
    // ── type only ────────────────────────────────────────────
    ProfileSpec {
        id: "lab",
        display_name: "Referto di laboratorio",
        facility_patterns: &[],
        filename_tokens: &[],
        document_type: Some(DocumentType::Laboratorio),
        preferred_strategy: StrategyKind::Table,
        anchors: &["Risultato", "Valori di riferimento"],
        field_rules: &[],
        preserve_tables: true,
    },
    ProfileSpec {
        id: "ps",
        display_name: "Verbale di pronto soccorso",
        facility_patterns: &[],
        filename_tokens: &[],
        document_type: Some(DocumentType::ProntoSoccorso),
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Pronto Soccorso", "Triage"],
        field_rules: PS_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "dimosp",
        display_name: "Lettera di dimissione ospedaliera",
        facility_patterns: &[],
        filename_tokens: &[],
        document_type: Some(DocumentType::Dimissione),
        preferred_strategy: StrategyKind::Simple,
        anchors: &["dimissione", "Diagnosi"],
        field_rules: DIMISSIONE_RULES,
        preserve_tables: false,
    },
    ProfileSpec {
        id: "spec",
        display_name: "Referto specialistico",
        facility_patterns: &[],
        filename_tokens: &[],
        document_type: Some(DocumentType::Specialistica),
        preferred_strategy: StrategyKind::Structured,
        anchors: &["Referto"],
        field_rules: &[],
        preserve_tables: false,
    },
    // ── catch-all ────────────────────────────────────────────
    ProfileSpec {
        id: "default",
        display_name: "Documento generico",
        facility_patterns: &[],
        filename_tokens: &[],
        document_type: None,
        preferred_strategy: StrategyKind::Simple,
        anchors: &[],
        field_rules: &[],
        preserve_tables: false,
    },
];
