// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Caching layer for generated templates
//!
//! Instruction and mask templates produced by a [`TemplateGenerator`] are
//! stored under a content hash so that recompiling an unchanged pipeline does
//! not ask the backend again.
//!
//! [`TemplateGenerator`]: crate::executors::TemplateGenerator

mod filesystem;
mod hash;
mod memory;

pub use filesystem::{FilesystemCache, DEFAULT_CACHE_DIR};
pub use hash::{hash_string, instruction_key, mask_key};
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::ChainflowError;

/// Trait for template cache implementations
#[async_trait]
pub trait TemplateCache: Send + Sync {
    /// Get the record stored under `key`
    async fn load(&self, key: &str) -> Result<Option<CachedTemplate>, ChainflowError>;

    /// Store a record under `key`, replacing any previous one
    async fn save(&self, key: &str, record: &CachedTemplate) -> Result<(), ChainflowError>;
}

/// What a cached template was generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Instruction,
    Mask,
}

/// Cached template entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTemplate {
    /// When the entry was cached
    pub timestamp: SystemTime,
    pub kind: TemplateKind,
    /// Link the template was first generated for
    pub link: String,
    pub purpose: Option<String>,
    pub variables: Vec<String>,
    /// Template text with canonical placeholders
    pub template: String,
}

impl CachedTemplate {
    pub fn new(
        kind: TemplateKind,
        link: &str,
        purpose: Option<&str>,
        variables: Vec<String>,
        template: String,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind,
            link: link.to_string(),
            purpose: purpose.map(str::to_string),
            variables,
            template,
        }
    }
}
