use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {field}: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    Laboratorio => "LAB",
    ProntoSoccorso => "PS",
    Dimissione => "DIMOSP",
    Specialistica => "SPEC",
    Altro => "DOC",
});

str_enum!(FieldKind {
    Name => "name",
    FiscalCode => "fiscal_code",
    Address => "address",
    Phone => "phone",
    DateOfBirth => "date_of_birth",
    Email => "email",
    Other => "other",
});

str_enum!(StrategyKind {
    Simple => "simple",
    Structured => "structured",
    Table => "table",
});

str_enum!(ProviderKind {
    Anthropic => "anthropic",
    OpenAi => "openai",
    Gemini => "gemini",
    Ollama => "ollama",
    OpenAiCompatible => "openai_compatible",
    Cli => "cli",
    Stub => "stub",
});

str_enum!(AnalysisStatus {
    Ok => "ok",
    ProviderError => "provider_error",
    Timeout => "timeout",
    Rejected => "rejected",
});

str_enum!(FailureKind {
    Extraction => "extraction",
    RedactionIntegrity => "redaction_integrity",
    ProviderTransient => "provider_transient",
    ProviderPermanent => "provider_permanent",
    Cancelled => "cancelled",
});

str_enum!(RuleLayer {
    Profile => "profile",
    Generic => "generic",
    Propagated => "propagated",
});

str_enum!(IntegrityStatus {
    Verified => "verified",
    Violated => "violated",
});

str_enum!(ProviderErrorKind {
    Timeout => "timeout",
    Connection => "connection",
    RateLimited => "rate_limited",
    Server => "server",
    Auth => "auth",
    MalformedRequest => "malformed_request",
    ContentPolicy => "content_policy",
    MalformedResponse => "malformed_response",
    Unavailable => "unavailable",
    ProcessFailed => "process_failed",
});

impl DocumentType {
    /// Human-readable label, as used in the downloaded file report.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Laboratorio => "LABORATORIO",
            Self::ProntoSoccorso => "PRONTO SOCCORSO",
            Self::Dimissione => "DIMISSIONE OSPEDALIERA",
            Self::Specialistica => "SPECIALISTICA",
            Self::Altro => "ALTRO",
        }
    }

    /// Derive the type from an FSE "tipologia" string.
    pub fn from_tipologia(tipologia: &str) -> Self {
        let upper = tipologia.trim().to_uppercase();
        if upper.contains("LABORATORIO") {
            Self::Laboratorio
        } else if upper.contains("PRONTO SOCCORSO") {
            Self::ProntoSoccorso
        } else if upper.contains("DIMISSIONE") {
            Self::Dimissione
        } else if upper.starts_with("REFERTO") {
            Self::Specialistica
        } else {
            Self::Altro
        }
    }

    /// Infer the type from lowercase filename tokens.
    ///
    /// Precedence is LAB > PS > DIMOSP > SPEC, so a "referto" carrying a
    /// lab token is still a lab document. `None` when no token is known.
    pub fn from_filename_tokens(tokens: &[String]) -> Option<Self> {
        let has = |candidates: &[&str]| tokens.iter().any(|t| candidates.contains(&t.as_str()));

        if has(&["lab", "labs", "laboratorio", "analisi", "esami"]) {
            Some(Self::Laboratorio)
        } else if has(&["ps", "prontosoccorso", "pronto", "soccorso"]) {
            Some(Self::ProntoSoccorso)
        } else if has(&["dimosp", "dimissione", "dimissioni"]) {
            Some(Self::Dimissione)
        } else if has(&["spec", "referto", "specialistica", "visita"]) {
            Some(Self::Specialistica)
        } else if has(&["doc"]) {
            Some(Self::Altro)
        } else {
            None
        }
    }
}

impl FieldKind {
    /// Fixed placeholder substituted for every span of this kind.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Name => "[NOME]",
            Self::FiscalCode => "[CF]",
            Self::Address => "[INDIRIZZO]",
            Self::Phone => "[TELEFONO]",
            Self::DateOfBirth => "[DATA_NASCITA]",
            Self::Email => "[EMAIL]",
            Self::Other => "[DATO]",
        }
    }

    pub const ALL: [FieldKind; 7] = [
        Self::Name,
        Self::FiscalCode,
        Self::Address,
        Self::Phone,
        Self::DateOfBirth,
        Self::Email,
        Self::Other,
    ];
}

impl StrategyKind {
    /// Fallback order: cheapest reconstruction first.
    pub const SEVERITY_ORDER: [StrategyKind; 3] = [Self::Simple, Self::Structured, Self::Table];
}

impl ProviderErrorKind {
    /// Worth another attempt: the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::RateLimited | Self::Server
        )
    }
}

impl ProviderKind {
    /// Model used when the configuration names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi | Self::OpenAiCompatible => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-flash",
            Self::Ollama => "medgemma:4b",
            Self::Cli => "cli",
            Self::Stub => "stub",
        }
    }

    /// Needs an API key to be constructed.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Anthropic | Self::OpenAi | Self::Gemini)
    }
}

impl FailureKind {
    /// What the caller should tell the user about this document.
    pub fn user_action(&self) -> &'static str {
        match self {
            Self::Extraction => "document skipped, can retry",
            Self::RedactionIntegrity => "document redaction unsafe, withheld from analysis",
            Self::ProviderTransient => "provider unavailable, retry later",
            Self::ProviderPermanent => "provider refused the request",
            Self::Cancelled => "batch cancelled before this document, can retry",
        }
    }
}
