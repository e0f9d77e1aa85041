//! # Application Configuration
//!
//! This module defines the configuration structure for the `groundrag-server` and
//! provides the logic for loading it from a `config.yml` file and environment
//! variables. Layers, lowest precedence first:
//!
//! 1.  Programmatic defaults (the library's default prompts).
//! 2.  The main YAML file, with `${VAR}` placeholders expanded from the environment.
//! 3.  An optional `prompt.yml` with prompt overrides.
//! 4.  Plain environment variables for top-level keys (`PORT`, `AUTH_ENABLED`).
//! 5.  `GROUNDRAG_`-prefixed variables for nested keys (`GROUNDRAG_PIPELINE__TOP_K`).

use config::{
    Config as ConfigBuilder, Environment, File, FileFormat, Value as ConfigValue,
    ValueKind as ConfigValueKind,
};
use groundrag::{pipeline::PipelineOptions, prompts::PromptTemplates};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
///
/// `Debug` output masks the JWT secret and provider API keys.
#[derive(Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether `/answer` requires a bearer JWT. Loaded from `AUTH_ENABLED` env var.
    #[serde(default)]
    pub auth_enabled: bool,
    /// The HS256 secret used to verify bearer tokens.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// When set, tokens must carry this `aud` claim (e.g. `authenticated`).
    #[serde(default)]
    pub jwt_audience: Option<String>,
    /// The generation engine used for expansion and answering.
    pub provider: ProviderConfig,
    /// The embedding endpoint backing the in-memory vector store.
    pub embedding: EmbeddingConfig,
    /// A JSON file of normalized chunks indexed at startup.
    #[serde(default)]
    pub corpus_path: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub prompts: PromptTemplates,
}

fn default_port() -> u16 {
    9090
}

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

/// Configuration for the embedding model provider.
#[derive(Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_enabled", &self.auth_enabled)
            .field("jwt_secret", &redacted(&self.jwt_secret))
            .field("jwt_audience", &self.jwt_audience)
            .field("provider", &self.provider)
            .field("embedding", &self.embedding)
            .field("corpus_path", &self.corpus_path)
            .field("pipeline", &self.pipeline)
            .field("prompts", &self.prompts)
            .finish()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redacted(&self.api_key))
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_url", &self.api_url)
            .field("model_name", &self.model_name)
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

/// Pipeline tunables. Durations are whole seconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub max_concurrent_searches: usize,
    pub retrieval_retries: u32,
    pub expansion_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub regenerate_on_invalid_citations: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            max_concurrent_searches: 4,
            retrieval_retries: 2,
            expansion_timeout_secs: 30,
            generation_timeout_secs: 60,
            search_timeout_secs: 10,
            regenerate_on_invalid_citations: true,
        }
    }
}

impl PipelineConfig {
    pub fn to_options(&self) -> PipelineOptions {
        PipelineOptions {
            top_k: self.top_k,
            max_concurrent_searches: self.max_concurrent_searches,
            retrieval_retries: self.retrieval_retries,
            expansion_timeout: Duration::from_secs(self.expansion_timeout_secs),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            regenerate_on_invalid_citations: self.regenerate_on_invalid_citations,
            ..PipelineOptions::default()
        }
    }
}

/// Treats a blank value, as left behind by an unset `${VAR}`, as absent.
pub fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Constructs a `config::Value` map of the default prompts from the library.
/// This serves as the base layer of configuration.
fn build_default_prompts() -> HashMap<String, ConfigValue> {
    let defaults = PromptTemplates::default();
    [
        ("query_expansion", defaults.query_expansion),
        ("answer_generation", defaults.answer_generation),
    ]
    .into_iter()
    .map(|(name, task)| {
        let mut table = HashMap::new();
        table.insert(
            "system_prompt".to_string(),
            ConfigValue::from(task.system_prompt),
        );
        table.insert(
            "user_prompt_template".to_string(),
            ConfigValue::from(task.user_prompt_template),
        );
        (
            name.to_string(),
            ConfigValue::new(None, ConfigValueKind::Table(table)),
        )
    })
    .collect()
}

fn env_placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}").expect("static env placeholder regex")
    })
}

// Reads a file and substitutes `${VAR}` from the environment (unset vars become "").
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let expanded_content = env_placeholder_regex().replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded_content.into_owned()))
}

/// Loads the application configuration from a file and environment variables.
///
/// Without an override, `config.yml` next to the crate manifest is used, falling
/// back to the bundled `config.example.yml`.
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults from the library.
        .set_default("prompts", build_default_prompts())?;

    // Layer 2: Main Config (with Fallback)
    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let fallback_path = format!("{base_path}/config.example.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?.ok_or_else(|| {
        ConfigError::NotFound(format!(
            "Main config file not found at '{main_config_path}'. Copy 'config.example.yml' to 'config.yml' to get started."
        ))
    })?;
    builder = builder.add_source(File::from_str(&main_content, FileFormat::Yaml));

    // Layer 3: User Prompt Overrides (Optional)
    let user_prompt_path = format!("{base_path}/prompt.yml");
    if let Some(user_prompts_content) = read_and_substitute(&user_prompt_path)? {
        info!("Loading user prompt overrides from '{user_prompt_path}'.");
        builder = builder.add_source(File::from_str(&user_prompts_content, FileFormat::Yaml));
    }

    let settings = builder
        // Layer 4: Load environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 5: Load prefixed environment variables for deeper overrides.
        .add_source(
            Environment::with_prefix("GROUNDRAG")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config
        .prompts
        .validate()
        .map_err(|e| ConfigError::General(e.to_string()))?;

    Ok(config)
}
