//! Configuration management for Lector
//!
//! A TOML file provides the base settings. A named profile may override a
//! few of them, and `LECTOR_SECTION__KEY` environment variables are applied
//! last. The result is validated as a whole before anything starts.

use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::{LectorError, Result};
use crate::indexing::DEFAULT_BATCH_SIZE;
use crate::retrieval::{
    ContextMode, UrlPolicy, DEFAULT_FALLBACK_URL_TEMPLATE, DEFAULT_SEPARATOR,
    DEFAULT_TOP_K_KEYWORD, DEFAULT_TOP_K_VECTOR, DEFAULT_URL_ATTRIBUTE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "LECTOR_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Finished generations kept on disk after a build
    #[serde(default = "default_keep_generations")]
    pub keep_generations: usize,
}

fn default_keep_generations() -> usize {
    2
}

/// Chunk window, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// L2-normalise vectors on insert and queries on search
    pub normalize: bool,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k_vector: usize,
    pub top_k_keyword: usize,
    /// Deadline for one whole retrieval; none when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_vector: DEFAULT_TOP_K_VECTOR,
            top_k_keyword: DEFAULT_TOP_K_KEYWORD,
            timeout_ms: None,
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub mode: ContextMode,
    pub separator: String,
    pub url_policy: UrlPolicy,
    pub url_attribute: String,
    pub fallback_url_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            mode: ContextMode::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            url_policy: UrlPolicy::default(),
            url_attribute: DEFAULT_URL_ATTRIBUTE.to_string(),
            fallback_url_template: DEFAULT_FALLBACK_URL_TEMPLATE.to_string(),
            max_context_chars: None,
        }
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Per-backend time limit
    pub timeout_ms: u64,
    /// Backends tried in order
    #[serde(default)]
    pub backends: Vec<GenerationBackend>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            backends: Vec::new(),
        }
    }
}

/// A local command used as a generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationBackend {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k_vector: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k_keyword: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<ContextMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_profile(profile)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LectorError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LectorError::io(e, format!("Failed to read config file: {:?}", path)))?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| LectorError::io(e, format!("Failed to write config file: {:?}", path)))?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            LectorError::InvalidConfigValue {
                path: "profiles".to_string(),
                message: format!("Unknown profile '{}'", profile),
            }
        })?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(k) = overrides.top_k_vector {
            self.retrieval.top_k_vector = k;
        }
        if let Some(k) = overrides.top_k_keyword {
            self.retrieval.top_k_keyword = k;
        }
        if let Some(ms) = overrides.retrieval_timeout_ms {
            self.retrieval.timeout_ms = Some(ms);
        }
        if let Some(mode) = overrides.context_mode {
            self.context.mode = mode;
        }
        if let Some(max) = overrides.max_context_chars {
            self.context.max_context_chars = Some(max);
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LECTOR_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `LECTOR_`-prefixed overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__KEEP_GENERATIONS" => self.storage.keep_generations = parse(path, value)?,
            "CHUNKING__SIZE" => self.chunking.size = parse(path, value)?,
            "CHUNKING__OVERLAP" => self.chunking.overlap = parse(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse(path, value)?,
            "INDEX__NORMALIZE" => self.index.normalize = parse(path, value)?,
            "RETRIEVAL__TOP_K_VECTOR" => self.retrieval.top_k_vector = parse(path, value)?,
            "RETRIEVAL__TOP_K_KEYWORD" => self.retrieval.top_k_keyword = parse(path, value)?,
            "RETRIEVAL__TIMEOUT_MS" => self.retrieval.timeout_ms = Some(parse(path, value)?),
            "CONTEXT__MODE" => self.context.mode = parse_enum(path, value)?,
            "CONTEXT__SEPARATOR" => self.context.separator = value.to_string(),
            "CONTEXT__URL_POLICY" => self.context.url_policy = parse_enum(path, value)?,
            "CONTEXT__MAX_CONTEXT_CHARS" => {
                self.context.max_context_chars = Some(parse(path, value)?)
            }
            "GENERATION__TIMEOUT_MS" => self.generation.timeout_ms = parse(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LectorError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lector").join("config.toml"))
    }

    /// Data directory with `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.lector"),
                keep_generations: default_keep_generations(),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            generation: GenerationConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

fn parse<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LectorError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Parse a snake_case enum value the same way the TOML file spells it
fn parse_enum<T: serde::de::DeserializeOwned>(path: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_string())).map_err(|e| {
        LectorError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}': {}", value, e),
        }
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LectorError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LectorError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
