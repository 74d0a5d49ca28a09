// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Tool functions

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ChainflowError;

/// A function a `@tool` link calls
///
/// Returning `None` (or `null`) leaves the input unchanged; a returned map is
/// merged over the input. Any other value fails the link.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, input: Map<String, Value>) -> Result<Option<Value>, ChainflowError>;
}

/// Adapter turning a plain closure into a [`Tool`]
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Option<Value>, ChainflowError> + Send + Sync,
{
    async fn call(&self, input: Map<String, Value>) -> Result<Option<Value>, ChainflowError> {
        (self.0)(input)
    }
}

/// Tools available to a pipeline, by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name
    pub fn register(&mut self, name: &str, tool: impl Tool + 'static) -> &mut Self {
        self.tools.insert(name.to_string(), Arc::new(tool));
        self
    }

    /// Register a closure as a tool
    pub fn register_fn<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(Map<String, Value>) -> Result<Option<Value>, ChainflowError> + Send + Sync + 'static,
    {
        self.register(name, FnTool(f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
