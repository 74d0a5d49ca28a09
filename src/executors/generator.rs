// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Template generation

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::completion::{Completion, CompletionRequest};
use crate::engine::EngineConfig;
use crate::errors::ChainflowError;

/// Writes templates the pipeline author left to be generated
#[async_trait]
pub trait TemplateGenerator: Send + Sync {
    /// Instruction template for `purpose` using every name in `variables` as a placeholder
    async fn instruction_template(
        &self,
        link: &str,
        purpose: &str,
        variables: &[String],
    ) -> Result<String, ChainflowError>;

    /// Mask template rendering one element through `variables`
    async fn mask_template(
        &self,
        link: &str,
        variables: &[String],
    ) -> Result<String, ChainflowError>;
}

/// Generator that asks a [`Completion`] backend for the template
pub struct CompletionTemplateGenerator {
    backend: Arc<dyn Completion>,
    config: EngineConfig,
}

impl CompletionTemplateGenerator {
    pub fn new(backend: Arc<dyn Completion>, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    async fn generate(&self, link: &str, instruction: String) -> Result<String, ChainflowError> {
        let schema = json!({
            "title": "GeneratedTemplate",
            "type": "object",
            "properties": { "template": { "type": "string" } },
            "required": ["template"],
        });

        let request = CompletionRequest::new(link, instruction, Some(schema), &self.config);
        match self.backend.complete(request).await? {
            Value::Object(mut answer) => match answer.remove("template") {
                Some(Value::String(template)) => Ok(template),
                _ => Err(ChainflowError::CompletionFailed {
                    link: link.to_string(),
                    message: "template generator answered without a `template` string".to_string(),
                }),
            },
            Value::String(template) => Ok(template),
            other => Err(ChainflowError::CompletionFailed {
                link: link.to_string(),
                message: format!("template generator answered with {}", other),
            }),
        }
    }
}

fn placeholder_list(variables: &[String]) -> String {
    variables
        .iter()
        .map(|v| format!("{{{}}}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl TemplateGenerator for CompletionTemplateGenerator {
    async fn instruction_template(
        &self,
        link: &str,
        purpose: &str,
        variables: &[String],
    ) -> Result<String, ChainflowError> {
        let instruction = format!(
            "Write a prompt template for a language model.\n\
             Purpose: {}\n\
             The template must use each of these placeholders exactly as written: {}.\n\
             Write literal braces as {{{{ and }}}}.",
            purpose,
            placeholder_list(variables),
        );
        self.generate(link, instruction).await
    }

    async fn mask_template(
        &self,
        link: &str,
        variables: &[String],
    ) -> Result<String, ChainflowError> {
        let instruction = format!(
            "Write a short single-line template that presents one item \
             through these placeholders: {}.\n\
             Use each placeholder exactly as written and add a short label before each one.",
            placeholder_list(variables),
        );
        self.generate(link, instruction).await
    }
}
