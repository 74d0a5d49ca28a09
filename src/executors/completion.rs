// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Completion backend contract

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::{EngineConfig, Provider};
use crate::errors::ChainflowError;

/// One call to the completion backend
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Link the request is made for
    pub link: String,
    /// Fully rendered instruction
    pub instruction: String,
    /// JSON Schema the answer must satisfy, when the link declares `out`
    pub schema: Option<Value>,
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Extra backend parameters passed through untouched
    pub model_kwargs: Map<String, Value>,
}

impl CompletionRequest {
    /// Build a request using the model settings of `config`
    pub fn new(
        link: &str,
        instruction: String,
        schema: Option<Value>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            link: link.to_string(),
            instruction,
            schema,
            provider: config.provider,
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            model_kwargs: config.model_kwargs.clone(),
        }
    }
}

/// Text-completion backend
///
/// Authentication, rate limiting and retries are the implementation's concern;
/// the engine treats any error as fatal for the link.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Answer one request with structured data
    async fn complete(&self, request: CompletionRequest) -> Result<Value, ChainflowError>;
}
