// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! # chainflow - Typed LLM pipelines from a small DSL
//!
//! `chainflow` compiles a directive-delimited pipeline document into an ordered
//! list of typed links and runs it, piping each link's output into the next.
//!
//! ## Features
//!
//! - **Typed outputs** - `def` and `out` sections become record schemas
//! - **Fan-out** - parallel links run once per list element on a bounded pool
//! - **Fan-in** - masks project each element back into one instruction
//! - **Tools** - registered functions run as links of their own
//! - **Template caching** - generated templates are stored under a content hash
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainflow::{Compiler, Engine, EngineConfig, EngineInput};
//!
//! let factory = Compiler::new().compile(source).await?;
//! let engine = Engine::new(factory, EngineConfig::default())?
//!     .with_completion(backend);
//! let output = engine.run(EngineInput::new().arg("topic", "tides")).await?;
//! ```

pub mod cache;
pub mod chain;
pub mod engine;
pub mod errors;
pub mod executors;
pub mod resolve;
pub mod schema;

// Re-export commonly used types
pub use chain::{Compiler, Factory, FanShape, Link};
pub use engine::{Engine, EngineConfig, EngineInput, EngineOutput, ReturnMode, TraceEntry};
pub use errors::{ChainflowError, ChainflowResult, ErrorKind};
pub use executors::{
    Completion, CompletionRequest, Confirm, Decision, TemplateGenerator, Tool, ToolRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
