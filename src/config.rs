use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::ProviderKind;
use crate::pipeline::analysis::ProviderConfig;
use crate::pipeline::extraction::confidence::thresholds;
use crate::pipeline::extraction::ExtractionConfig;
use crate::pipeline::profiles::ProfileOverrides;
use crate::pipeline::redaction::RedactionConfig;

/// Application-level constants
pub const APP_NAME: &str = "FSE Processor";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Credentials file, `KEY=value` lines.
pub const SETTINGS_FILE: &str = "settings.env";
pub const CONFIG_FILE: &str = "fse-referti.toml";

/// Checked before the provider-specific variable.
pub const API_KEY_ENV: &str = "FSE_API_KEY";

/// Per-user data directory (`~/.local/share/FSE Processor` on Linux).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(CONFIG_FILE))
}

pub fn settings_env_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(SETTINGS_FILE))
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "fse_referti=info,warn"
}

/// Provider-specific credential variable.
pub fn provider_key_env(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => Some("OPENAI_API_KEY"),
        ProviderKind::Gemini => Some("GEMINI_API_KEY"),
        ProviderKind::Ollama | ProviderKind::Cli | ProviderKind::Stub => None,
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings file {path}: {reason}")]
    Env { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub acceptability_threshold: f32,
    /// Anchor tokens replacing a profile's built-in list, keyed by profile id.
    pub anchors: HashMap<String, Vec<String>>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            acceptability_threshold: thresholds::DEFAULT_ACCEPTABILITY,
            anchors: HashMap::new(),
        }
    }
}

/// Everything the pipeline reads from disk and environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub extraction: ExtractionSettings,
    pub redaction: RedactionConfig,
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Load `path`, or the default config file when present, then apply
    /// `settings.env` and credential variables. Extraction settings are
    /// validated here; provider settings by `validate_provider`, once
    /// command-line overrides are in.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };

        load_settings_env()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate_extraction()?;

        tracing::debug!(
            provider = %config.provider.kind,
            threshold = config.extraction.acceptability_threshold,
            anchor_overrides = config.extraction.anchors.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Fill the API key from the environment when the file gives none.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            return;
        }
        let from_env = std::iter::once(API_KEY_ENV)
            .chain(provider_key_env(self.provider.kind))
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()));
        if from_env.is_some() {
            self.provider.api_key = from_env;
        }
    }

    /// Switch provider kind. Key, model and endpoint from the file belong
    /// to the configured vendor, so they are kept only when the kind does
    /// not change.
    pub fn override_provider(
        &mut self,
        kind: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        if self.provider.kind == kind {
            return;
        }
        self.provider.kind = kind;
        self.provider.api_key = None;
        self.provider.model = None;
        self.provider.endpoint = None;
        self.apply_env(lookup);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_extraction()?;
        self.validate_provider()
    }

    pub fn validate_extraction(&self) -> Result<(), ConfigError> {
        let threshold = self.extraction.acceptability_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "extraction.acceptability_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if let Some((id, _)) = self.extraction.anchors.iter().find(|(_, a)| a.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "extraction.anchors.{id} is empty"
            )));
        }
        Ok(())
    }

    pub fn validate_provider(&self) -> Result<(), ConfigError> {
        let provider = &self.provider;
        if provider.max_attempts == 0 {
            return Err(ConfigError::Invalid("provider.max_attempts must be at least 1".into()));
        }
        if provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider.timeout_secs must be at least 1".into()));
        }
        if provider.max_tokens == 0 {
            return Err(ConfigError::Invalid("provider.max_tokens must be at least 1".into()));
        }
        if let Some(t) = provider.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "provider.temperature must be within [0, 2], got {t}"
                )));
            }
        }
        if provider.kind == ProviderKind::Cli && provider.command.is_empty() {
            return Err(ConfigError::Invalid("provider.command is required for the cli provider".into()));
        }
        if provider.kind == ProviderKind::OpenAiCompatible && provider.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "provider.endpoint is required for openai_compatible".into(),
            ));
        }
        Ok(())
    }

    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            acceptability_threshold: self.extraction.acceptability_threshold,
        }
    }

    pub fn profile_overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            anchors: self.extraction.anchors.clone(),
        }
    }
}

/// Load `settings.env` from the working directory and the data directory.
/// Variables already set in the environment win.
fn load_settings_env() -> Result<(), ConfigError> {
    let candidates = std::iter::once(PathBuf::from(SETTINGS_FILE)).chain(settings_env_path());
    for path in candidates.filter(|p| p.is_file()) {
        dotenvy::from_path(&path).map_err(|e| ConfigError::Env {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[extraction]
acceptability_threshold = 0.75

[extraction.anchors]
synlab_lab = ["SYNLAB", "Referto di laboratorio"]

[redaction]
redact_all_dates = true

[provider]
kind = "anthropic"
model = "claude-3-5-sonnet-latest"
timeout_secs = 60
max_attempts = 4
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_all_sections() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.extraction.acceptability_threshold, 0.75);
        assert_eq!(config.extraction.anchors["synlab_lab"].len(), 2);
        assert!(config.redaction.redact_all_dates);
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(config.provider.max_attempts, 4);
        assert_eq!(config.provider.max_tokens, 2048);
        config.validate().unwrap();
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.extraction_config().acceptability_threshold, 0.6);
        config.validate().unwrap();
    }

    #[test]
    fn api_key_from_generic_then_specific_env() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.apply_env(env(&[("ANTHROPIC_API_KEY", "specific")]));
        assert_eq!(config.provider.api_key.as_deref(), Some("specific"));

        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.apply_env(env(&[(API_KEY_ENV, "generic"), ("ANTHROPIC_API_KEY", "specific")]));
        assert_eq!(config.provider.api_key.as_deref(), Some("generic"));
    }

    #[test]
    fn file_key_wins_over_env() {
        let mut config = AppConfig::from_toml("[provider]\nkind = \"openai\"\napi_key = \"from-file\"").unwrap();
        config.apply_env(env(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn out_of_range_values_rejected() {
        let bad = [
            "[extraction]\nacceptability_threshold = 1.5",
            "[provider]\nmax_attempts = 0",
            "[provider]\ntimeout_secs = 0",
            "[provider]\ntemperature = 3.0",
            "[provider]\nkind = \"cli\"",
            "[provider]\nkind = \"openai_compatible\"",
            "[extraction.anchors]\nsynlab_lab = []",
        ];
        for raw in bad {
            let config = AppConfig::from_toml(raw).unwrap();
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{raw}");
        }
    }

    #[test]
    fn unknown_provider_kind_is_parse_error() {
        assert!(matches!(
            AppConfig::from_toml("[provider]\nkind = \"watson\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[provider]\nkind = \"stub\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Stub);
    }

    #[test]
    fn load_leaves_provider_checks_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[provider]\nkind = \"cli\"\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.validate_extraction().is_ok());
        assert!(matches!(config.validate_provider(), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "[extraction]\nacceptability_threshold = 2.0\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn same_provider_override_keeps_file_settings() {
        let mut config = AppConfig::from_toml(
            "[provider]\nkind = \"openai\"\napi_key = \"from-file\"\nmodel = \"gpt-4o\"",
        )
        .unwrap();
        config.override_provider(ProviderKind::OpenAi, env(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.provider.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn other_provider_override_drops_vendor_settings() {
        let mut config = AppConfig::from_toml(
            "[provider]\nkind = \"openai\"\napi_key = \"openai-key\"\nmodel = \"gpt-4o\"",
        )
        .unwrap();
        config.override_provider(ProviderKind::Anthropic, env(&[("ANTHROPIC_API_KEY", "anthropic-key")]));
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(config.provider.api_key.as_deref(), Some("anthropic-key"));
        assert!(config.provider.model.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn load_missing_explicit_file_is_io_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/fse.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_carry_anchors() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert!(config.profile_overrides().anchors.contains_key("synlab_lab"));
    }

    #[test]
    fn data_dir_named_after_app() {
        if let Some(dir) = app_data_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
