// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Engine configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::cache::{FilesystemCache, MemoryCache, TemplateCache};
use crate::errors::ChainflowError;
use std::sync::Arc;

/// Completion provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Anthropic,
    Ollama,
}

impl Provider {
    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Ollama => "llama3.2",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model name; the provider's default when absent
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature in `[0, 1]`
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Extra parameters forwarded to the backend
    #[serde(default)]
    pub model_kwargs: Map<String, Value>,

    /// Upper bound on concurrent invocations of one parallel link
    #[serde(default = "default_max_parallel_links")]
    pub max_parallel_links: usize,

    /// Ask the confirmation checkpoint before every link
    #[serde(default)]
    pub pause_between_links: bool,

    /// Return the trace collected so far along with a link failure
    #[serde(default)]
    pub surface_partial_trace: bool,

    /// Template cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            model_kwargs: Map::new(),
            max_parallel_links: default_max_parallel_links(),
            pause_between_links: false,
            surface_partial_trace: false,
            cache: CacheConfig::default(),
        }
    }
}

fn default_temperature() -> f32 {
    0.5
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_max_parallel_links() -> usize {
    10
}

impl EngineConfig {
    /// Load configuration from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file(path: &Path) -> Result<Self, ChainflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| ChainflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Parse and validate TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self, ChainflowError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self, ChainflowError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ChainflowError::InvalidConfig {
            field: "<document>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ChainflowError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(invalid("temperature", format!("{} is outside [0, 1]", self.temperature)));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be greater than 0".to_string()));
        }
        if self.max_parallel_links == 0 {
            return Err(invalid("max_parallel_links", "must be at least 1".to_string()));
        }
        if matches!(self.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(invalid("model", "must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured model, or the provider default
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

fn invalid(field: &str, reason: String) -> ChainflowError {
    ChainflowError::InvalidConfig {
        field: field.to_string(),
        reason,
    }
}

/// Template cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_dir(),
        }
    }
}

impl CacheConfig {
    /// Open the configured store; a disabled cache is an empty in-memory one
    pub fn open(&self) -> Result<Arc<dyn TemplateCache>, ChainflowError> {
        if self.enabled {
            Ok(Arc::new(FilesystemCache::new(&self.directory)?))
        } else {
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(crate::cache::DEFAULT_CACHE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.provider, Provider::Openai);
        assert_eq!(config.model_name(), "gpt-4o");
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.max_parallel_links, 10);
        assert!(!config.pause_between_links);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
provider = "anthropic"
max_parallel_links = 4

[model_kwargs]
top_p = 0.9

[cache]
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.model_name(), "claude-3-5-sonnet-latest");
        assert_eq!(config.max_parallel_links, 4);
        assert_eq!(config.model_kwargs["top_p"], 0.9);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.directory, PathBuf::from(".chainflow/cache"));
    }

    #[test]
    fn test_from_yaml() {
        let config = EngineConfig::from_yaml_str("provider: ollama\nmodel: qwen2.5\n").unwrap();
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.model_name(), "qwen2.5");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = EngineConfig::from_yaml_str("temperature: 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ChainflowError::InvalidConfig { ref field, .. } if field == "temperature"
        ));

        let config = EngineConfig {
            max_parallel_links: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
