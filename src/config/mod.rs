//! Configuration for the search service.
//!
//! The root to index comes from a positional CLI argument, falling back to
//! `SEMANTIC_CODE_ROOT`, falling back to the current working directory. The
//! index location comes from `SEMANTIC_CODE_INDEX`, defaulting to
//! `<root>/.semantic-code/index/`. Optional settings load from
//! `<root>/.semantic-code/config.toml`.


use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::{Result, SearchError};

pub const ROOT_ENV_VAR: &str = "SEMANTIC_CODE_ROOT";
pub const INDEX_ENV_VAR: &str = "SEMANTIC_CODE_INDEX";
const CONFIG_DIR: &str = ".semantic-code";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(skip)]
    pub root: PathBuf,
    #[serde(skip)]
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for RerankerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: false,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    /// Files processed per batch.
    pub file_batch_size: usize,
    /// Pending records flushed to the store at this count.
    pub max_chunks_in_memory: usize,
    /// Glob patterns excluded from the scan.
    pub ignore: Vec<String>,
}

impl Default for IndexingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            file_batch_size: 10,
            max_chunks_in_memory: 500,
            ignore: default_ignore_patterns(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid host: {0} (cannot be empty)")]
    InvalidHost(String),
    #[error("Invalid file batch size: {0} (must be between 1 and 100)")]
    InvalidFileBatchSize(usize),
    #[error("Invalid chunk buffer size: {0} (must be between 1 and 100000)")]
    InvalidChunkBuffer(usize),
    #[error("Invalid max file size: {0} (must be between 1 and 104857600 bytes)")]
    InvalidMaxFileSize(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Resolve the effective configuration: CLI root > `SEMANTIC_CODE_ROOT` >
    /// current directory, then overlay `<root>/.semantic-code/config.toml`.
    #[inline]
    pub fn resolve(cli_root: Option<PathBuf>) -> Result<Self> {
        let root = match cli_root {
            Some(root) => root,
            None => match env::var(ROOT_ENV_VAR) {
                Ok(value) if !value.is_empty() => PathBuf::from(value),
                _ => env::current_dir()
                    .map_err(|e| SearchError::Config(format!("cannot resolve cwd: {e}")))?,
            },
        };

        let root = root.canonicalize().map_err(|e| {
            SearchError::Config(format!("root {} is not accessible: {e}", root.display()))
        })?;

        let index_path = match env::var(INDEX_ENV_VAR) {
            Ok(value) if !value.is_empty() => PathBuf::from(value),
            _ => root.join(CONFIG_DIR).join("index"),
        };

        let mut config = Self::load(&root)?;
        config.root = root;
        config.index_path = index_path;
        config
            .validate()
            .map_err(|e| SearchError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load settings from `<root>/.semantic-code/config.toml`, defaulting
    /// when the file does not exist.
    #[inline]
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.ollama.validate()?;
        self.reranker.validate()?;
        self.indexing.validate()?;
        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn endpoint(&self) -> anyhow::Result<Url> {
        Url::parse(&format!("{}://{}:{}/", self.protocol, self.host, self.port))
            .context("failed to build Ollama URL")
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_endpoint(&self.protocol, &self.host, self.port)?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        Ok(())
    }
}

impl RerankerConfig {
    #[inline]
    pub fn endpoint(&self) -> anyhow::Result<Url> {
        Url::parse(&format!("{}://{}:{}/", self.protocol, self.host, self.port))
            .context("failed to build reranker URL")
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.enabled {
            validate_endpoint(&self.protocol, &self.host, self.port)?;
        }
        Ok(())
    }
}

impl IndexingConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(1..=100).contains(&self.file_batch_size) {
            return Err(ConfigError::InvalidFileBatchSize(self.file_batch_size));
        }
        if !(1..=100_000).contains(&self.max_chunks_in_memory) {
            return Err(ConfigError::InvalidChunkBuffer(self.max_chunks_in_memory));
        }
        if !(1..=100 * 1024 * 1024).contains(&self.max_file_size) {
            return Err(ConfigError::InvalidMaxFileSize(self.max_file_size));
        }
        Ok(())
    }
}

fn validate_endpoint(
    protocol: &str,
    host: &str,
    port: u16,
) -> std::result::Result<(), ConfigError> {
    if protocol != "http" && protocol != "https" {
        return Err(ConfigError::InvalidProtocol(protocol.to_string()));
    }
    if host.trim().is_empty() {
        return Err(ConfigError::InvalidHost(host.to_string()));
    }
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

/// Directories and files never worth indexing.
#[inline]
pub fn default_ignore_patterns() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/.git/**",
        "**/dist/**",
        "**/build/**",
        "**/.next/**",
        "**/coverage/**",
        "**/__pycache__/**",
        "**/venv/**",
        "**/.venv/**",
        "**/target/**",
        "**/vendor/**",
        "**/*.min.js",
        "**/*.bundle.js",
        "**/*.map",
        "**/package-lock.json",
        "**/yarn.lock",
        "**/pnpm-lock.yaml",
        "**/.semantic-code/**",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
