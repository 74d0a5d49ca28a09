// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Invoking one link with a resolved input

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::config::EngineConfig;
use crate::chain::Link;
use crate::errors::ChainflowError;
use crate::executors::{Completion, CompletionRequest, ToolRegistry};

/// Cheap-to-clone handle to everything a link invocation needs
///
/// Cloned into every fan-out task.
#[derive(Clone)]
pub(crate) struct Invoker {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) completion: Option<Arc<dyn Completion>>,
    pub(crate) tools: Arc<ToolRegistry>,
}

impl Invoker {
    /// Run `link` once on `input`
    pub(crate) async fn invoke(
        &self,
        link: &Link,
        input: Map<String, Value>,
    ) -> Result<Value, ChainflowError> {
        if link.is_tool() {
            self.call_tool(link, input).await
        } else {
            self.complete(link, input).await
        }
    }

    async fn call_tool(
        &self,
        link: &Link,
        input: Map<String, Value>,
    ) -> Result<Value, ChainflowError> {
        let tool = self
            .tools
            .get(&link.name)
            .ok_or_else(|| ChainflowError::ToolNotRegistered {
                tool: link.name.clone(),
            })?;

        let returned = tool.call(input.clone()).await?;
        merge_tool_output(&link.name, input, returned)
    }

    async fn complete(
        &self,
        link: &Link,
        input: Map<String, Value>,
    ) -> Result<Value, ChainflowError> {
        let completion = self
            .completion
            .as_ref()
            .ok_or(ChainflowError::MissingCompletion)?;

        let prompt = link.prompt.as_ref().ok_or_else(|| ChainflowError::MissingPrompt {
            line: link.line,
            name: link.name.clone(),
        })?;

        let instruction = prompt.template.render(&input)?;
        let schema = link.output.as_ref().map(|record| record.json_schema());

        debug!(link = %link.name, chars = instruction.len(), "requesting completion");
        let request = CompletionRequest::new(&link.name, instruction, schema, &self.config);
        let answer = completion.complete(request).await?;

        shape_output(link, answer)
    }
}

/// Merge a tool's return value over its input
pub(crate) fn merge_tool_output(
    tool: &str,
    mut input: Map<String, Value>,
    returned: Option<Value>,
) -> Result<Value, ChainflowError> {
    match returned {
        None | Some(Value::Null) => Ok(Value::Object(input)),
        Some(Value::Object(output)) => {
            input.extend(output);
            Ok(Value::Object(input))
        }
        Some(other) => Err(ChainflowError::ToolReturnedNonMap {
            tool: tool.to_string(),
            found: kind_name(&other).to_string(),
        }),
    }
}

/// Conform an answer to the link's `out` record, or wrap a bare value
fn shape_output(link: &Link, answer: Value) -> Result<Value, ChainflowError> {
    match (&link.output, answer) {
        (Some(record), answer) => record.conform(&answer),
        (None, Value::Object(map)) => Ok(Value::Object(map)),
        (None, other) => {
            let mut wrapped = Map::new();
            wrapped.insert("output".to_string(), other);
            Ok(Value::Object(wrapped))
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_tool_returning_nothing_keeps_input() {
        let input = map(json!({ "x": 1 }));
        assert_eq!(merge_tool_output("t", input.clone(), None).unwrap(), json!({ "x": 1 }));
        assert_eq!(merge_tool_output("t", input, Some(Value::Null)).unwrap(), json!({ "x": 1 }));
    }

    #[test]
    fn test_tool_output_merges_over_input() {
        let input = map(json!({ "x": 1, "y": 0 }));
        let merged = merge_tool_output("t", input, Some(json!({ "y": 2 }))).unwrap();
        assert_eq!(merged, json!({ "x": 1, "y": 2 }));
    }

    #[test]
    fn test_tool_returning_non_map_fails() {
        let err = merge_tool_output("t", Map::new(), Some(json!([1, 2]))).unwrap_err();
        assert!(matches!(
            err,
            ChainflowError::ToolReturnedNonMap { ref found, .. } if found == "a list"
        ));
    }
}
