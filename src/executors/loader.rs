// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Loading `@extends` targets

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::ChainflowError;

/// Resolves the path of an `@extends` directive to source text
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<String, ChainflowError>;
}

/// Loads sources from disk relative to a root directory
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for FsLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl SourceLoader for FsLoader {
    async fn load(&self, path: &str) -> Result<String, ChainflowError> {
        tokio::fs::read_to_string(self.root.join(path))
            .await
            .map_err(|e| ChainflowError::SourceLoad {
                path: path.to_string(),
                error: e.to_string(),
            })
    }
}

/// Sources held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, path: &str, source: &str) -> Self {
        self.sources.insert(path.to_string(), source.to_string());
        self
    }
}

#[async_trait]
impl SourceLoader for MemoryLoader {
    async fn load(&self, path: &str) -> Result<String, ChainflowError> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| ChainflowError::SourceLoad {
                path: path.to_string(),
                error: "no such source".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_loader_reads_relative_to_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("base.chain"), "prompt: hi").unwrap();

        let loader = FsLoader::new(temp_dir.path());
        assert_eq!(loader.load("base.chain").await.unwrap(), "prompt: hi");

        let err = loader.load("missing.chain").await.unwrap_err();
        assert!(matches!(err, ChainflowError::SourceLoad { .. }));
    }
}
