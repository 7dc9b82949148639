use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::graph::RelationType;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub lexigraph: LexigraphConfig,
    pub embeddings: EmbeddingsConfig,
    pub discovery: DiscoveryConfig,
}

/// Storage and logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LexigraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embedding service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// Only "openai" is supported
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub batch_size: usize,
    pub dimensions: usize,
    /// Batches in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

/// Relation discovery configuration (retrieval, classification, acceptance)
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Chat model used as the classification oracle
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_allowed_relations")]
    pub allowed_relations: Vec<RelationType>,
    /// Pause between consecutive oracle calls
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_senses_per_run: Option<usize>,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_top_k() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.7
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_allowed_relations() -> Vec<RelationType> {
    RelationType::ALL.to_vec()
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_oracle_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in LEXIGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("LEXIGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration text without touching the environment
    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values and required credentials
    pub fn validate(&self) -> Result<()> {
        for env_name in [&self.embeddings.api_key_env, &self.discovery.api_key_env] {
            std::env::var(env_name).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    env_name
                )
            })?;
        }

        if self.embeddings.provider != "openai" {
            anyhow::bail!(
                "embeddings.provider '{}' is not supported (expected \"openai\")",
                self.embeddings.provider
            );
        }

        if self.embeddings.timeout_secs == 0 {
            anyhow::bail!("embeddings.timeout_secs must be greater than 0");
        }

        if self.discovery.timeout_secs == 0 {
            anyhow::bail!("discovery.timeout_secs must be greater than 0");
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.embeddings.max_concurrency == 0 {
            anyhow::bail!("embeddings.max_concurrency must be greater than 0");
        }

        if self.discovery.top_k == 0 {
            anyhow::bail!("discovery.top_k must be greater than 0");
        }

        if !(-1.0..=1.0).contains(&self.discovery.min_similarity) {
            anyhow::bail!("discovery.min_similarity must be between -1.0 and 1.0");
        }

        if !(0.0..=1.0).contains(&self.discovery.min_confidence) {
            anyhow::bail!("discovery.min_confidence must be between 0.0 and 1.0");
        }

        if self.discovery.allowed_relations.is_empty() {
            anyhow::bail!("discovery.allowed_relations must name at least one relation type");
        }

        Ok(())
    }

    /// Resolve the embedding API key from the configured environment variable
    pub fn embeddings_api_key(&self) -> Result<String> {
        read_api_key(&self.embeddings.api_key_env)
    }

    /// Resolve the oracle API key from the configured environment variable
    pub fn discovery_api_key(&self) -> Result<String> {
        read_api_key(&self.discovery.api_key_env)
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.lexigraph.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.lexigraph.migrations_dir
    }
}

impl EmbeddingsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn read_api_key(env_name: &str) -> Result<String> {
    std::env::var(env_name).with_context(|| format!("Environment variable {} not set", env_name))
}
