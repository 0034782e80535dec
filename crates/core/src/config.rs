//! Configuration management for RAGent.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.ragent/config.yaml` or `RAGENT_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The resulting [`AppConfig`] is read-only once the pipeline is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Known completion providers.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Known retrieval backends.
pub const KNOWN_BACKENDS: [&str; 2] = ["wikipedia", "local"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragent/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Completion provider ("ollama", "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// API key for the completion provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Retriever Adapter settings
    pub retrieval: RetrievalSettings,

    /// Evidence and generation settings
    pub pipeline: PipelineSettings,

    /// Safety Gate settings
    pub safety: SafetySettings,

    /// Groundedness Verifier settings
    pub verification: VerificationSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Any server speaking the OpenAI chat completions protocol
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        timeout: Option<u64>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } | ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }

    /// HTTP timeout in seconds, if any.
    pub fn timeout(&self) -> Option<u64> {
        match self {
            ProviderConfig::OpenAI { timeout, .. } | ProviderConfig::Ollama { timeout, .. } => {
                *timeout
            }
        }
    }
}

/// Retriever Adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// Backend kind ("wikipedia" or "local")
    pub backend: String,

    /// Endpoint override for HTTP backends
    pub endpoint: Option<String>,

    /// Corpus file for the local backend (YAML or JSON)
    pub corpus_path: Option<PathBuf>,

    /// Maximum passages returned per retrieval
    pub top_k: usize,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Passages scoring below this after normalisation are discarded
    pub min_score: f32,

    /// Maximum characters per split passage
    pub passage_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            backend: "wikipedia".to_string(),
            endpoint: None,
            corpus_path: None,
            top_k: 10,
            timeout_secs: 20,
            min_score: 0.0,
            passage_chars: 1200,
        }
    }
}

/// Evidence assembly and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Maximum combined evidence size, in characters
    pub evidence_budget_chars: usize,

    /// Completion length cap
    pub max_response_tokens: u32,

    /// Sampling temperature for grounded generation
    pub temperature: f32,

    /// Per-call completion timeout in seconds
    pub generation_timeout_secs: u64,

    /// Ask the model for a search query before retrieving
    pub rewrite_query: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            evidence_budget_chars: 2048,
            max_response_tokens: 1024,
            temperature: 0.1,
            generation_timeout_secs: 60,
            rewrite_query: false,
        }
    }
}

/// Safety Gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SafetySettings {
    /// Questions longer than this (in characters) are blocked
    pub max_question_chars: usize,

    /// Risk at or above this blocks the question
    pub block_threshold: f32,

    /// Risk at or above this marks the question suspicious
    pub suspicious_threshold: f32,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            max_question_chars: 2000,
            block_threshold: 0.7,
            suspicious_threshold: 0.2,
        }
    }
}

/// How the verifier treats answers whose citations only partly resolve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PartialPolicy {
    /// Any stripped citation downgrades to PARTIAL
    #[default]
    Conservative,
    /// PARTIAL when enough citations resolve, INSUFFICIENT_EVIDENCE otherwise
    Coverage {
        #[serde(rename = "minValidRatio")]
        min_valid_ratio: f32,
    },
}

/// Groundedness Verifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationSettings {
    pub partial_policy: PartialPolicy,

    /// Uncited answers are at most PARTIAL
    pub require_citations: bool,

    /// Minimum share of a cited sentence's terms found in its passages
    pub min_claim_support: f32,

    /// Answers shorter than this (after stripping markers) are trivial
    pub min_answer_chars: usize,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            partial_policy: PartialPolicy::default(),
            require_citations: true,
            min_claim_support: 0.2,
            min_answer_chars: 12,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    retrieval: Option<RetrievalSettings>,
    pipeline: Option<PipelineSettings>,
    safety: Option<SafetySettings>,
    verification: Option<VerificationSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "granite3.3:8b".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            retrieval: RetrievalSettings::default(),
            pipeline: PipelineSettings::default(),
            safety: SafetySettings::default(),
            verification: VerificationSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RAGENT_WORKSPACE`: Override workspace path
    /// - `RAGENT_CONFIG`: Path to config file
    /// - `RAGENT_PROVIDER`: Completion provider
    /// - `RAGENT_MODEL`: Model identifier
    /// - `RAGENT_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragent_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGENT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGENT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.ragent_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGENT_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGENT_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("RAGENT_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }
        if let Some(safety) = config_file.safety {
            result.safety = safety;
        }
        if let Some(verification) = config_file.verification {
            result.verification = verification;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragent directory.
    pub fn ragent_dir(&self) -> PathBuf {
        self.workspace.join(".ragent")
    }

    /// Get the configuration for a provider, if the config file declared one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint configured for the active provider.
    pub fn provider_endpoint(&self) -> Option<&str> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::endpoint)
    }

    /// HTTP timeout configured for the active provider.
    pub fn provider_timeout(&self) -> Option<u64> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::timeout)
    }

    /// Resolve the API key for a provider.
    ///
    /// `RAGENT_API_KEY` wins over the provider's `apiKeyEnv` variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            _ => None,
        }
    }

    /// Validate the configuration before building the pipeline.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.provider == "openai" && self.resolve_api_key("openai").is_none() {
            return Err(AppError::Config(
                "The openai provider requires an API key (RAGENT_API_KEY or apiKeyEnv)"
                    .to_string(),
            ));
        }

        let retrieval = &self.retrieval;
        if !KNOWN_BACKENDS.contains(&retrieval.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown retrieval backend: {}. Supported: {}",
                retrieval.backend,
                KNOWN_BACKENDS.join(", ")
            )));
        }
        if retrieval.backend == "local" && retrieval.corpus_path.is_none() {
            return Err(AppError::Config(
                "The local backend requires retrieval.corpusPath".to_string(),
            ));
        }
        if retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be positive".to_string()));
        }
        if retrieval.passage_chars == 0 {
            return Err(AppError::Config(
                "retrieval.passageChars must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&retrieval.min_score) {
            return Err(AppError::Config(
                "retrieval.minScore must be within [0, 1]".to_string(),
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.evidence_budget_chars == 0 {
            return Err(AppError::Config(
                "pipeline.evidenceBudgetChars must be positive".to_string(),
            ));
        }
        if pipeline.max_response_tokens == 0 {
            return Err(AppError::Config(
                "pipeline.maxResponseTokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&pipeline.temperature) {
            return Err(AppError::Config(
                "pipeline.temperature must be within [0, 2]".to_string(),
            ));
        }

        let safety = &self.safety;
        if !(0.0 < safety.suspicious_threshold
            && safety.suspicious_threshold <= safety.block_threshold
            && safety.block_threshold <= 1.0)
        {
            return Err(AppError::Config(
                "safety thresholds must satisfy 0 < suspicious <= block <= 1".to_string(),
            ));
        }

        if let PartialPolicy::Coverage { min_valid_ratio } = self.verification.partial_policy {
            if !(0.0..=1.0).contains(&min_valid_ratio) {
                return Err(AppError::Config(
                    "verification.partialPolicy.minValidRatio must be within [0, 1]".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.retrieval.backend, "wikipedia");
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.pipeline.evidence_budget_chars, 2048);
        assert_eq!(config.verification.partial_policy, PartialPolicy::Conservative);
        assert!(!config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ragent_dir() {
        let config = AppConfig::default();
        assert!(config.ragent_dir().ends_with(".ragent"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4o-mini".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o-mini");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://gpu-box:11434
      model: llama3.2
      timeout: 45
retrieval:
  backend: local
  corpusPath: corpus.yaml
  topK: 4
pipeline:
  evidenceBudgetChars: 900
verification:
  partialPolicy:
    mode: coverage
    minValidRatio: 0.5
logging:
  level: warn
  color: false
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.provider_endpoint(), Some("http://gpu-box:11434"));
        assert_eq!(config.provider_timeout(), Some(45));
        assert_eq!(config.retrieval.backend, "local");
        assert_eq!(config.retrieval.top_k, 4);
        // Unspecified fields keep their defaults
        assert_eq!(config.retrieval.timeout_secs, 20);
        assert_eq!(config.pipeline.evidence_budget_chars, 900);
        assert_eq!(config.pipeline.max_response_tokens, 1024);
        assert_eq!(
            config.verification.partial_policy,
            PartialPolicy::Coverage {
                min_valid_ratio: 0.5
            }
        );
        assert_eq!(config.log_level, Some("warn".to_string()));
        assert!(config.no_color);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_openai_needs_key() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        config.api_key = None;
        assert!(config.validate().is_err());

        config.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_local_backend_needs_corpus() {
        let mut config = AppConfig::default();
        config.retrieval.backend = "local".to_string();
        assert!(config.validate().is_err());

        config.retrieval.corpus_path = Some(PathBuf::from("corpus.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.evidence_budget_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_thresholds() {
        let mut config = AppConfig::default();
        config.safety.suspicious_threshold = 0.8;
        config.safety.block_threshold = 0.5;
        assert!(config.validate().is_err());
    }
}
