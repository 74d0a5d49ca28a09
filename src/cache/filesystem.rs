// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Filesystem-based template cache
//!
//! Stores each record as a JSON file under a two-character prefix directory.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{CachedTemplate, TemplateCache};
use crate::errors::ChainflowError;

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = ".chainflow/cache";

/// Filesystem-based cache
#[derive(Debug, Clone)]
pub struct FilesystemCache {
    cache_dir: PathBuf,
}

impl FilesystemCache {
    /// Create a new filesystem cache
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, ChainflowError> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir)
                .map_err(|e| cache_error("create cache directory", e))?;
        }

        Ok(Self { cache_dir })
    }

    /// Get path for a cache entry
    fn cache_path(&self, key: &str) -> PathBuf {
        let (prefix, rest) = key.split_at(2.min(key.len()));
        self.cache_dir.join(prefix).join(format!("{}.json", rest))
    }
}

#[async_trait]
impl TemplateCache for FilesystemCache {
    async fn load(&self, key: &str) -> Result<Option<CachedTemplate>, ChainflowError> {
        let path = self.cache_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| cache_error("read cache entry", e))?;

        let entry =
            serde_json::from_str(&content).map_err(|e| cache_error("parse cache entry", e))?;

        Ok(Some(entry))
    }

    async fn save(&self, key: &str, record: &CachedTemplate) -> Result<(), ChainflowError> {
        let path = self.cache_path(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_error("create cache directory", e))?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| cache_error("serialize cache entry", e))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| cache_error("write cache entry", e))
    }
}

fn cache_error(action: &str, e: impl std::fmt::Display) -> ChainflowError {
    ChainflowError::CacheError {
        message: format!("Failed to {}: {}", action, e),
    }
}
