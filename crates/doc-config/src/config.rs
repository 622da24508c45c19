use std::path::{Path, PathBuf};

use doc_core::tenant::is_valid_project_name;
use doc_queue::OverflowPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_max_sources")]
    pub rag_default_max_sources: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
            rag_default_max_sources: default_max_sources(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}
fn default_search_max_limit() -> usize {
    50
}
fn default_max_sources() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LinkResolutionConfig {
    #[serde(default = "default_link_depth")]
    pub max_depth: usize,
}

impl Default for LinkResolutionConfig {
    fn default() -> Self {
        Self { max_depth: default_link_depth() }
    }
}

fn default_link_depth() -> usize {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExternalDocsConfig {
    #[serde(default)]
    pub roots: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CustomDocTypesConfig {
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_embedding_dim(),
            concurrency: default_concurrency(),
            embedding_model: default_embedding_model(),
            generation_model: default_generation_model(),
        }
    }
}

fn default_embedding_dim() -> usize {
    1024
}
fn default_concurrency() -> usize {
    2
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_generation_model() -> String {
    "llama3.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicyConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicyConfig::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyConfig {
    #[default]
    DropOldest,
    DropNewest,
    Reject,
}

impl From<OverflowPolicyConfig> for OverflowPolicy {
    fn from(value: OverflowPolicyConfig) -> Self {
        match value {
            OverflowPolicyConfig::DropOldest => OverflowPolicy::DropOldest,
            OverflowPolicyConfig::DropNewest => OverflowPolicy::DropNewest,
            OverflowPolicyConfig::Reject => OverflowPolicy::Reject,
        }
    }
}

/// Top-level engine configuration (§6.4). Loaded once at activation and
/// hot-reloaded thereafter; a config file that fails validation is rejected
/// and the previous snapshot is kept in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    pub project_name: String,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub link_resolution: LinkResolutionConfig,
    #[serde(default)]
    pub external_docs: ExternalDocsConfig,
    #[serde(default)]
    pub custom_doc_types: CustomDocTypesConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_project_name(&self.project_name) {
            return Err(ConfigError::InvalidField {
                field: "project_name".to_string(),
                reason: "must match ^[a-z][a-z0-9-]*$".to_string(),
            });
        }
        if self.retrieval.default_limit == 0 || self.retrieval.default_limit > self.retrieval.max_limit {
            return Err(ConfigError::InvalidField {
                field: "retrieval.default_limit".to_string(),
                reason: "must be >=1 and <= retrieval.max_limit".to_string(),
            });
        }
        if !(1..=4).contains(&self.embedding.concurrency) {
            return Err(ConfigError::InvalidField {
                field: "embedding.concurrency".to_string(),
                reason: "must be between 1 and 4".to_string(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidField {
                field: "embedding.dimension".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config = EngineConfig::parse(r#"{"project_name": "demo"}"#).unwrap();
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.embedding.concurrency, 2);
        assert_eq!(config.retrieval.default_limit, 10);
    }

    #[test]
    fn invalid_project_name_is_rejected() {
        let err = EngineConfig::parse(r#"{"project_name": "Not Valid"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "project_name"));
    }

    #[test]
    fn concurrency_out_of_range_is_rejected() {
        let err = EngineConfig::parse(r#"{"project_name": "demo", "embedding": {"concurrency": 9}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field, .. } if field == "embedding.concurrency"));
    }
}
