//! Immutable runtime configuration.
//!
//! Settings are loaded once (defaults, then an optional JSON file, then
//! environment overrides) and threaded explicitly through the pipeline.

use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::FilterRules;
use crate::models::StatusCategories;
use crate::query::{DEFAULT_VAGUE_THRESHOLD, WeekStart};
use crate::ranker::SortCriterion;
use crate::scoring::ScoringWeights;
use crate::vocabulary::Vocabulary;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Errors in configuration, reported before any query runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("At least one expansion language must be configured")]
    EmptyLanguages,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid sort order: {0}")]
    InvalidSortOrder(String),

    #[error("Missing API key for provider '{provider}' (set OPENAI_API_KEY)")]
    MissingApiKey { provider: String },

    #[error("Missing model name for provider '{provider}' (set TASKLENS_MODEL)")]
    MissingModel { provider: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "open-ai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(ConfigError::invalid(
                "provider.kind",
                format!("unknown provider '{other}'"),
            )),
        }
    }
}

/// Model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Endpoint; falls back to the provider's well-known default.
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Retries for transient transport failures. Zero disables retrying.
    pub max_retries: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: None,
            model: None,
            api_key: None,
            timeout_secs: 60,
            max_retries: 0,
        }
    }
}

impl ProviderSettings {
    /// Endpoint to use, with the provider default applied.
    pub fn effective_base_url(&self) -> &str {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url,
            (None, ProviderKind::Ollama) => DEFAULT_OLLAMA_URL,
            (None, ProviderKind::OpenAi) => DEFAULT_OPENAI_URL,
        }
    }

    /// Checks that a client could be built from these settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.effective_base_url();
        reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("{url}: {e}")))?;

        if self.model.as_deref().is_none_or(|m| m.trim().is_empty()) {
            return Err(ConfigError::MissingModel {
                provider: self.kind.to_string(),
            });
        }
        if self.kind == ProviderKind::OpenAi
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey {
                provider: self.kind.to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("provider.timeout_secs", "must be positive"));
        }
        Ok(())
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Languages keywords are expanded into.
    pub languages: Vec<String>,
    pub expansion_enabled: bool,
    /// Maximum variants per (core keyword, language).
    pub expansions_per_language: usize,
    pub vague_threshold: f64,
    pub week_start: WeekStart,
    pub status_categories: StatusCategories,
    pub weights: ScoringWeights,
    /// Fraction of the theoretical maximum a task must reach; 0 = adaptive.
    pub quality_filter_strength: f64,
    /// Minimum relevance sub-score when keywords exist; 0 = off.
    pub min_relevance: f64,
    pub max_direct_results: usize,
    pub max_tasks_for_ai: usize,
    pub sort_criteria: Vec<SortCriterion>,
    pub stop_words: Vec<String>,
    pub generic_words: Vec<String>,
    pub filters: FilterRules,
    pub provider: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            languages: vec!["English".to_string(), "中文".to_string()],
            expansion_enabled: true,
            expansions_per_language: 5,
            vague_threshold: DEFAULT_VAGUE_THRESHOLD,
            week_start: WeekStart::Monday,
            status_categories: StatusCategories::default(),
            weights: ScoringWeights::default(),
            quality_filter_strength: 0.0,
            min_relevance: 0.0,
            max_direct_results: 50,
            max_tasks_for_ai: 30,
            sort_criteria: SortCriterion::default_order(),
            stop_words: Vec::new(),
            generic_words: Vec::new(),
            filters: FilterRules::default(),
            provider: ProviderSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings: defaults, then the config file if one exists, then
    /// environment overrides (a `.env` file in the working directory is
    /// honored).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut settings = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env_overrides()?;
        tracing::debug!(provider = %settings.provider.kind, "configuration loaded");
        Ok(settings)
    }

    /// Reads settings from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment variable overrides.
    ///
    /// # Environment Variables
    ///
    /// - `TASKLENS_PROVIDER`: `ollama` or `openai`
    /// - `OLLAMA_HOST`, `OLLAMA_MODEL`: Ollama endpoint and model
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: OpenAI-compatible credentials and endpoint
    /// - `TASKLENS_MODEL`: model for whichever provider is active (wins over `OLLAMA_MODEL`)
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        if let Some(kind) = var("TASKLENS_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }
        match self.provider.kind {
            ProviderKind::Ollama => {
                if let Some(host) = var("OLLAMA_HOST") {
                    self.provider.base_url = Some(host);
                }
                if let Some(model) = var("OLLAMA_MODEL") {
                    self.provider.model = Some(model);
                }
            }
            ProviderKind::OpenAi => {
                if let Some(url) = var("OPENAI_BASE_URL") {
                    self.provider.base_url = Some(url);
                }
            }
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = var("TASKLENS_MODEL") {
            self.provider.model = Some(model);
        }
        Ok(())
    }

    /// Checks every setting the pipeline relies on. Provider settings are
    /// checked separately, only when a model backend is needed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::EmptyLanguages);
        }
        if self.expansion_enabled && self.expansions_per_language == 0 {
            return Err(ConfigError::invalid(
                "expansions_per_language",
                "must be at least 1 when expansion is enabled",
            ));
        }
        if !(self.vague_threshold > 0.0 && self.vague_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "vague_threshold",
                format!("{} is outside (0, 1]", self.vague_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_filter_strength) {
            return Err(ConfigError::invalid(
                "quality_filter_strength",
                format!("{} is outside [0, 1]", self.quality_filter_strength),
            ));
        }
        if !(self.min_relevance >= 0.0 && self.min_relevance.is_finite()) {
            return Err(ConfigError::invalid(
                "min_relevance",
                format!("{} is negative", self.min_relevance),
            ));
        }
        if self.max_direct_results == 0 {
            return Err(ConfigError::invalid("max_direct_results", "must be positive"));
        }
        if self.max_tasks_for_ai == 0 {
            return Err(ConfigError::invalid("max_tasks_for_ai", "must be positive"));
        }
        self.weights
            .validate()
            .map_err(|reason| ConfigError::invalid("weights", reason))?;
        self.validate_sort_order()?;
        self.validate_status_categories()
    }

    fn validate_sort_order(&self) -> Result<(), ConfigError> {
        if self.sort_criteria.is_empty() {
            return Err(ConfigError::InvalidSortOrder(
                "at least one criterion is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for criterion in &self.sort_criteria {
            if !seen.insert(criterion) {
                return Err(ConfigError::InvalidSortOrder(format!(
                    "'{criterion}' appears more than once"
                )));
            }
        }
        Ok(())
    }

    fn validate_status_categories(&self) -> Result<(), ConfigError> {
        let categories = self.status_categories.categories();
        if categories.is_empty() {
            return Err(ConfigError::invalid(
                "status_categories",
                "at least one category is required",
            ));
        }
        let mut keys = HashSet::new();
        for category in categories {
            if category.key.trim().is_empty() {
                return Err(ConfigError::invalid("status_categories", "empty key"));
            }
            if !keys.insert(category.key.as_str()) {
                return Err(ConfigError::invalid(
                    "status_categories",
                    format!("duplicate key '{}'", category.key),
                ));
            }
            if !(category.score >= 0.0 && category.score.is_finite()) {
                return Err(ConfigError::invalid(
                    "status_categories",
                    format!("score of '{}' must be non-negative", category.key),
                ));
            }
        }
        Ok(())
    }

    /// Term tables built from these settings.
    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::new(&self.status_categories, &self.stop_words, &self.generic_words)
    }

    /// Languages with blank entries removed.
    pub fn expansion_languages(&self) -> Vec<String> {
        self.languages
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Stable fingerprint of every setting; changes whenever any field does.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(self)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some("********".to_string());
        }
        copy
    }
}

/// Location of the config file: `$TASKLENS_CONFIG`, else
/// `{config_dir}/tasklens/config.json`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TASKLENS_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("tasklens").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const PROVIDER_VARS: [&str; 6] = [
        "TASKLENS_PROVIDER",
        "OLLAMA_HOST",
        "OLLAMA_MODEL",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "TASKLENS_MODEL",
    ];

    fn clear_env() {
        for key in PROVIDER_VARS {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.languages, vec!["English", "中文"]);
        assert_eq!(settings.expansions_per_language, 5);
        assert_eq!(settings.max_direct_results, 50);
        assert_eq!(settings.max_tasks_for_ai, 30);
    }

    #[test]
    fn empty_language_list_is_rejected() {
        let settings = Settings {
            languages: vec![" ".to_string()],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::EmptyLanguages)));
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        let settings = Settings {
            quality_filter_strength: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue {
                field: "quality_filter_strength",
                ..
            })
        ));

        let settings = Settings {
            vague_threshold: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn duplicate_sort_criteria_are_rejected() {
        let settings = Settings {
            sort_criteria: vec![SortCriterion::Priority, SortCriterion::Priority],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSortOrder(_))
        ));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "languages": ["English", "Svenska"], "vague_threshold": 0.6 }"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.languages, vec!["English", "Svenska"]);
        assert_eq!(settings.vague_threshold, 0.6);
        assert_eq!(settings.max_direct_results, 50);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn openai_requires_api_key() {
        let provider = ProviderSettings {
            kind: ProviderKind::OpenAi,
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            provider.validate(),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn provider_requires_model() {
        let provider = ProviderSettings::default();
        assert!(matches!(
            provider.validate(),
            Err(ConfigError::MissingModel { .. })
        ));
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let a = Settings::default();
        let mut b = Settings::default();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.weights.relevance = 10.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn redacted_masks_api_key() {
        let mut settings = Settings::default();
        settings.provider.api_key = Some("sk-secret".to_string());
        let printed = serde_json::to_string(&settings.redacted()).unwrap();
        assert!(!printed.contains("sk-secret"));
    }

    #[test]
    #[serial]
    fn env_overrides_select_openai() {
        clear_env();
        unsafe {
            std::env::set_var("TASKLENS_PROVIDER", "openai");
            std::env::set_var("OPENAI_API_KEY", "sk-test");
            std::env::set_var("TASKLENS_MODEL", "gpt-4o-mini");
        }

        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();
        assert_eq!(settings.provider.kind, ProviderKind::OpenAi);
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.provider.effective_base_url(), DEFAULT_OPENAI_URL);
        assert!(settings.provider.validate().is_ok());

        clear_env();
    }

    #[test]
    #[serial]
    fn ollama_env_vars_apply_and_model_override_wins() {
        clear_env();
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://gpu-box:11434");
            std::env::set_var("OLLAMA_MODEL", "qwen2.5:7b");
        }

        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();
        assert_eq!(settings.provider.effective_base_url(), "http://gpu-box:11434");
        assert_eq!(settings.provider.model.as_deref(), Some("qwen2.5:7b"));

        unsafe {
            std::env::set_var("TASKLENS_MODEL", "llama3.2");
        }
        settings.apply_env_overrides().unwrap();
        assert_eq!(settings.provider.model.as_deref(), Some("llama3.2"));

        clear_env();
    }

    #[test]
    #[serial]
    fn unknown_provider_is_a_config_error() {
        clear_env();
        unsafe {
            std::env::set_var("TASKLENS_PROVIDER", "carrier-pigeon");
        }
        let mut settings = Settings::default();
        assert!(settings.apply_env_overrides().is_err());
        clear_env();
    }
}
