//! TOML configuration.
//!
//! The configuration is loaded once at startup by [`load_config`], validated,
//! and then passed around by reference. API keys are read from the
//! environment variables named in the file during loading and never looked
//! up again afterwards.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub notes: NotesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./storage")
}

/// Chat-completion service used for extraction (and, unless overridden by
/// `[generation]`, for answers).
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Prompt template containing `CONTENT_PLACEHOLDER` exactly once.
    pub prompt_file: PathBuf,
    pub model: String,
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. Empty for keyless servers.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_extraction_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Resolved from `api_key_env` by [`load_config`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_extraction_temperature() -> f32 {
    0.1
}
fn default_chat_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL: `https://api.openai.com/v1` for `openai`,
    /// `http://localhost:11434` for `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Send `dimensions` with OpenAI-compatible requests.
    #[serde(default)]
    pub request_dimensions: bool,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            api_key_env: default_api_key_env(),
            request_dimensions: false,
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Predicate types followed from evidence to its Concept; empty = any.
    #[serde(default)]
    pub owner_predicates: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            owner_predicates: Vec::new(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// Optional overrides for answer generation. Unset fields fall back to
/// `[extraction]`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GenerationConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rag_log")]
    pub rag_log: PathBuf,
    #[serde(default = "default_direct_log")]
    pub direct_log: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            rag_log: default_rag_log(),
            direct_log: default_direct_log(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}
fn default_rag_log() -> PathBuf {
    PathBuf::from("./logs/rag_log.jsonl")
}
fn default_direct_log() -> PathBuf {
    PathBuf::from("./logs/direct_log.jsonl")
}

/// Read `api_key_env` from the environment; `None` when the name is empty
/// or the variable is unset.
fn resolve_api_key(var: &str) -> Option<String> {
    if var.is_empty() {
        return None;
    }
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text, resolving API keys.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.extraction.model.trim().is_empty() {
        bail!("extraction.model must not be empty");
    }
    if config.extraction.timeout_secs == 0 {
        bail!("extraction.timeout_secs must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if let Some(t) = config.generation.timeout_secs {
        if t == 0 {
            bail!("generation.timeout_secs must be > 0");
        }
    }

    config.extraction.api_key = resolve_api_key(&config.extraction.api_key_env);
    config.embedding.api_key = resolve_api_key(&config.embedding.api_key_env);

    Ok(config)
}
