//! Configuration for the mailroom pipeline
//!
//! Settings load from an optional TOML file layered with `MAILROOM_*`
//! environment overrides. Thresholds are static configuration: the matching
//! engine never tunes them at runtime.

use crate::error::{MailroomError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Similarity threshold applied to semantic candidates
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

/// How many ranked candidates a review item carries
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the SQLite database file; resolved lazily when empty
    pub database_path: Option<String>,

    pub resolver: ResolverConfig,
    pub assist: AssistConfig,
    pub embedding: EmbeddingConfig,
}

impl Settings {
    /// Load settings from an optional file plus `MAILROOM_*` env overrides.
    ///
    /// Nested keys use `__` in the environment, e.g.
    /// `MAILROOM_RESOLVER__SIMILARITY_THRESHOLD=0.8`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("mailroom").required(false));
        }

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix("MAILROOM").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolver.validate()?;
        self.embedding.validate()?;
        Ok(())
    }

    /// Resolve the database path: explicit setting, then `MAILROOM_DB_PATH`,
    /// then the platform data-local directory.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(|| env::var("MAILROOM_DB_PATH").ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mailroom")
                    .join("mailroom.db")
            })
    }
}

/// Matching-engine thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum cosine similarity for a semantic candidate
    pub similarity_threshold: f32,

    /// Ranked candidates attached to a queued review item
    pub max_candidates: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(MailroomError::Config(config::ConfigError::Message(
                format!(
                    "similarity_threshold must be in [0.0, 1.0], got {}",
                    self.similarity_threshold
                ),
            )));
        }
        if self.max_candidates == 0 {
            return Err(MailroomError::Config(config::ConfigError::Message(
                "max_candidates must be at least 1".to_string(),
            )));
        }
        Ok(())
    }
}

/// Language-model assist configuration (segmentation + extraction)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Model used for both assist calls
    pub model: String,

    /// Per-call timeout. Assist calls are bounded; a timeout degrades to the
    /// heuristic path rather than aborting the pipeline.
    pub timeout_secs: u64,

    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-20241022".to_string(),
            timeout_secs: 30,
            max_tokens: 1500,
            temperature: 0.1,
        }
    }
}

impl AssistConfig {
    /// API key read from the environment; an empty key means the assist is
    /// unavailable and the heuristic path runs instead.
    pub fn api_key(&self) -> String {
        env::var("ANTHROPIC_API_KEY").unwrap_or_default()
    }
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name; `hashing` selects the offline n-gram embedder
    pub model: String,

    /// Cache directory for downloaded models
    pub cache_dir: PathBuf,

    pub show_download_progress: bool,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("mailroom")
                .join("models"),
            show_download_progress: false,
            batch_size: 32,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimensions() == 0 {
            return Err(MailroomError::Config(config::ConfigError::Message(
                format!("Unsupported embedding model: '{}'", self.model),
            )));
        }
        if self.batch_size == 0 {
            return Err(MailroomError::Config(config::ConfigError::Message(
                "batch_size must be at least 1".to_string(),
            )));
        }
        Ok(())
    }

    /// Output dimensions for the configured model; 0 for unknown models
    pub fn dimensions(&self) -> usize {
        match self.model.as_str() {
            "all-MiniLM-L6-v2" | "bge-small-en-v1.5" | "hashing" => 384,
            "all-MiniLM-L12-v2" => 384,
            "nomic-embed-text-v1" | "nomic-embed-text-v1.5" | "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.resolver.similarity_threshold,
            DEFAULT_SIMILARITY_THRESHOLD
        );
        assert_eq!(settings.resolver.max_candidates, DEFAULT_MAX_CANDIDATES);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = ResolverConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_embedding_model_rejected() {
        let config = EmbeddingConfig {
            model: "not-a-model".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_known_model_dimensions() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.dimensions(), 384);

        let config = EmbeddingConfig {
            model: "nomic-embed-text-v1.5".to_string(),
            ..Default::default()
        };
        assert_eq!(config.dimensions(), 768);
    }
}
