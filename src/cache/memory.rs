// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! In-process template cache

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CachedTemplate, TemplateCache};
use crate::errors::ChainflowError;

/// Cache kept in memory for the lifetime of the value
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedTemplate>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TemplateCache for MemoryCache {
    async fn load(&self, key: &str) -> Result<Option<CachedTemplate>, ChainflowError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, record: &CachedTemplate) -> Result<(), ChainflowError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), record.clone());
        Ok(())
    }
}
