// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Pipeline engine
//!
//! Walks the links of a [`Factory`] strictly in order. Each link consumes the
//! output of the one before it; a parallel link fans out over its predecessor's
//! list output and rejoins before the next link starts.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::config::EngineConfig;
use super::fanout::fan_out;
use super::invoke::Invoker;
use super::trace::{total_elapsed, TraceEntry};
use crate::chain::{Factory, FanShape, Link};
use crate::errors::ChainflowError;
use crate::executors::{Completion, Confirm, Decision, ToolRegistry};
use crate::resolve::{traverse, FieldResolver, StageHistory};

/// Key under which the engine input is known to the first link
const INPUT: &str = "input";

/// Arguments of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInput {
    values: Map<String, Value>,
}

impl EngineInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one keyword argument
    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Use a JSON object as the input map
    pub fn from_value(value: Value) -> Result<Self, ChainflowError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(ChainflowError::EmptyInput),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<Map<String, Value>> for EngineInput {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// What a run returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// The last link's output
    #[default]
    Output,
    /// Every trace entry
    Trace,
}

/// Result of [`Engine::call`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    Output(Value),
    Trace(Vec<TraceEntry>),
}

/// Pipeline engine
pub struct Engine {
    factory: Factory,
    invoker: Invoker,
    confirm: Option<Arc<dyn Confirm>>,
}

impl Engine {
    /// Create an engine for a compiled pipeline
    pub fn new(factory: Factory, config: EngineConfig) -> Result<Self, ChainflowError> {
        config.validate()?;
        Ok(Self {
            factory,
            invoker: Invoker {
                config: Arc::new(config),
                completion: None,
                tools: Arc::new(ToolRegistry::new()),
            },
            confirm: None,
        })
    }

    /// Set the completion backend used by chain links
    pub fn with_completion(mut self, completion: Arc<dyn Completion>) -> Self {
        self.invoker.completion = Some(completion);
        self
    }

    /// Set the tools available to tool links
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.invoker.tools = Arc::new(tools);
        self
    }

    /// Set the checkpoint consulted before each link when pausing is enabled
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.invoker.config
    }

    /// Run the pipeline and return the last link's output
    pub async fn run(&self, input: EngineInput) -> Result<Value, ChainflowError> {
        match self.call(input, ReturnMode::Output).await? {
            EngineOutput::Output(output) => Ok(output),
            EngineOutput::Trace(trace) => last_output(trace),
        }
    }

    /// Run the pipeline and return the full trace
    pub async fn run_traced(&self, input: EngineInput) -> Result<Vec<TraceEntry>, ChainflowError> {
        match self.call(input, ReturnMode::Trace).await? {
            EngineOutput::Trace(trace) => Ok(trace),
            EngineOutput::Output(_) => Err(ChainflowError::EmptyTrace),
        }
    }

    /// Run the pipeline
    ///
    /// A run stopped at the confirmation checkpoint before any link executed
    /// is reported as [`ChainflowError::EmptyTrace`].
    #[instrument(skip_all, fields(links = self.factory.len()))]
    pub async fn call(
        &self,
        input: EngineInput,
        mode: ReturnMode,
    ) -> Result<EngineOutput, ChainflowError> {
        if input.is_empty() {
            return Err(ChainflowError::EmptyInput);
        }

        if self.invoker.config.pause_between_links && self.confirm.is_none() {
            return Err(ChainflowError::InvalidConfig {
                field: "pause_between_links".to_string(),
                reason: "pausing needs a confirmation checkpoint, see Engine::with_confirm"
                    .to_string(),
            });
        }

        let trace = self.execute(input.into_value()).await?;
        if trace.is_empty() {
            return Err(ChainflowError::EmptyTrace);
        }

        info!(
            links = trace.len(),
            elapsed_ms = total_elapsed(&trace).as_millis() as u64,
            "run finished"
        );

        match mode {
            ReturnMode::Trace => Ok(EngineOutput::Trace(trace)),
            ReturnMode::Output => last_output(trace).map(EngineOutput::Output),
        }
    }

    async fn execute(&self, input: Value) -> Result<Vec<TraceEntry>, ChainflowError> {
        let mut trace: Vec<TraceEntry> = Vec::with_capacity(self.factory.len());
        let mut history = StageHistory::new();
        history.record(INPUT, input.clone());
        let mut previous_output = input;
        let mut previous_link: Option<&Link> = None;

        for link in &self.factory.links {
            if self.invoker.config.pause_between_links {
                if let Some(ref confirm) = self.confirm {
                    if confirm.confirm(&link.name, &previous_output).await == Decision::Abort {
                        info!(
                            link = %link.name,
                            completed = trace.len(),
                            "run stopped at confirmation"
                        );
                        break;
                    }
                }
            }

            let started = Instant::now();
            let step = self
                .run_link(link, previous_link, &previous_output, &history)
                .await;

            let (input, output) = match step {
                Ok(step) => step,
                Err(e) => return Err(self.failed(link, e, trace)),
            };

            let elapsed = started.elapsed();
            debug!(
                link = %link.name,
                shape = %link.shape,
                elapsed_ms = elapsed.as_millis() as u64,
                "link finished"
            );

            history.record(&link.name, output.clone());
            trace.push(TraceEntry {
                link: link.name.clone(),
                shape: link.shape,
                is_tool: link.is_tool(),
                input,
                output: output.clone(),
                elapsed,
            });

            previous_output = output;
            previous_link = Some(link.as_ref());
        }

        Ok(trace)
    }

    fn failed(&self, link: &Link, error: ChainflowError, trace: Vec<TraceEntry>) -> ChainflowError {
        if self.invoker.config.surface_partial_trace {
            ChainflowError::StageFailed {
                link: link.name.clone(),
                source: Box::new(error),
                trace,
            }
        } else {
            error
        }
    }

    /// Execute one link; returns its input and output as recorded in the trace
    async fn run_link(
        &self,
        link: &Arc<Link>,
        previous_link: Option<&Link>,
        previous_output: &Value,
        history: &StageHistory,
    ) -> Result<(Value, Value), ChainflowError> {
        let after_parallel = previous_link.map_or(false, |p| p.shape.is_parallel());
        let previous_name = previous_link.map_or(INPUT, |p| p.name.as_str());

        // A parallel predecessor's list output is addressed under its name
        let source = if after_parallel {
            let mut wrapped = Map::new();
            wrapped.insert(previous_name.to_string(), previous_output.clone());
            Value::Object(wrapped)
        } else {
            previous_output.clone()
        };

        let resolver = FieldResolver::new(history);

        match link.shape {
            FanShape::Sequential => {
                let input = if after_parallel {
                    convex_input(link, previous_name, previous_output, &source, &resolver)?
                } else {
                    resolver.resolve(&link.name, &link.variables, &source)?
                };

                let output = self.invoker.invoke(link, input.clone()).await?;
                Ok((Value::Object(input), output))
            }
            FanShape::Parallel => {
                let inputs =
                    resolver.partition(&link.name, previous_name, &link.variables, &source)?;
                let recorded = Value::Array(inputs.iter().cloned().map(Value::Object).collect());

                let limit = self.invoker.config.max_parallel_links;
                let invoker = self.invoker.clone();
                let task_link = Arc::clone(link);
                let outputs = fan_out(
                    &link.name,
                    limit,
                    inputs,
                    move |input| {
                        let invoker = invoker.clone();
                        let link = Arc::clone(&task_link);
                        async move { invoker.invoke(&link, input).await }
                    },
                )
                .await?;

                Ok((recorded, Value::Array(outputs)))
            }
        }
    }
}

/// Input of a sequential link following a parallel one
///
/// Chain links get the mask rendered once per element, numbered and joined,
/// under their own name. Tools get the per-element inputs as a list under the
/// predecessor's name.
fn convex_input(
    link: &Link,
    previous_name: &str,
    previous_output: &Value,
    source: &Value,
    resolver: &FieldResolver<'_>,
) -> Result<Map<String, Value>, ChainflowError> {
    let Value::Array(items) = previous_output else {
        return Err(ChainflowError::EmptyPreviousOutput {
            link: link.name.clone(),
        });
    };

    if link.is_tool() {
        let elements = if link.variables.is_empty() {
            items.clone()
        } else {
            items
                .iter()
                .map(|item| {
                    let values = link
                        .variables
                        .iter()
                        .map(|v| {
                            let value = traverse(item, v.path.relative_to_element(previous_name))
                                .cloned()
                                .unwrap_or(Value::Null);
                            (v.key(), value)
                        })
                        .collect();
                    Value::Object(values)
                })
                .collect()
        };

        let mut input = Map::new();
        input.insert(previous_name.to_string(), Value::Array(elements));
        return Ok(input);
    }

    let mask = link.mask.as_ref().ok_or_else(|| ChainflowError::MaskUnresolved {
        link: link.name.clone(),
    })?;

    let mut resolved_any = false;
    let mut renderings = Vec::with_capacity(items.len());

    for item in items {
        let mut values = Map::new();
        for variable in &mask.variables {
            let relative = variable.relative_to_element(previous_name);
            let found = traverse(item, relative);
            resolved_any |= found.is_some();

            let value = found.cloned().unwrap_or(Value::Null);
            // Templates may name the variable either way
            values.insert(relative.join("$"), value.clone());
            values.insert(variable.canonical(), value);
        }
        renderings.push(mask.template.render(&values)?);
    }

    if !items.is_empty() && !resolved_any {
        return Err(ChainflowError::MaskUnresolved {
            link: link.name.clone(),
        });
    }

    let joined = renderings
        .iter()
        .enumerate()
        .map(|(i, rendering)| format!("({}) {}", i + 1, rendering))
        .collect::<Vec<_>>()
        .join("\n");

    let others: Vec<_> = link
        .variables
        .iter()
        .filter(|v| v.key() != link.name)
        .cloned()
        .collect();

    let mut input = resolver.resolve_available(&others, source);
    input.insert(link.name.clone(), Value::String(joined));
    Ok(input)
}

fn last_output(trace: Vec<TraceEntry>) -> Result<Value, ChainflowError> {
    trace
        .into_iter()
        .last()
        .map(|entry| entry.output)
        .ok_or(ChainflowError::EmptyTrace)
}
