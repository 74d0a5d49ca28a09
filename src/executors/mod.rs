// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! External collaborators
//!
//! The compiler and the engine never talk to a model or the filesystem
//! directly. Each capability is a trait object supplied by the caller:
//!
//! - [`Completion`] answers a rendered instruction, optionally shaped by a JSON Schema
//! - [`TemplateGenerator`] writes instruction and mask templates from a purpose
//! - [`Tool`]s are registered by name in a [`ToolRegistry`]
//! - [`Confirm`] is consulted before each link when pausing is enabled
//! - [`SourceLoader`] resolves `@extends` targets

mod completion;
mod confirm;
mod generator;
mod loader;
mod tools;

pub use completion::{Completion, CompletionRequest};
pub use confirm::{Confirm, Decision};
pub use generator::{CompletionTemplateGenerator, TemplateGenerator};
pub use loader::{FsLoader, MemoryLoader, SourceLoader};
pub use tools::{FnTool, Tool, ToolRegistry};
