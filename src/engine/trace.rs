// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Execution trace

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::chain::FanShape;

/// Record of one executed link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub link: String,
    pub shape: FanShape,
    pub is_tool: bool,
    /// Input handed to the link; a list of per-element inputs for parallel links
    pub input: Value,
    /// Output produced; a list of per-element outputs for parallel links
    pub output: Value,
    pub elapsed: Duration,
}

/// Total time spent across `trace`
pub fn total_elapsed(trace: &[TraceEntry]) -> Duration {
    trace.iter().map(|entry| entry.elapsed).sum()
}
