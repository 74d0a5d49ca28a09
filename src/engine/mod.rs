// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Execution engine
//!
//! [`Engine`] runs a compiled [`Factory`](crate::chain::Factory) against an
//! [`EngineInput`] and returns either the last link's output or the full
//! [`TraceEntry`] list.

mod config;
mod fanout;
mod invoke;
mod runner;
mod trace;

pub use config::{CacheConfig, EngineConfig, Provider};
pub use fanout::fan_out;
pub use runner::{Engine, EngineInput, EngineOutput, ReturnMode};
pub use trace::{total_elapsed, TraceEntry};
