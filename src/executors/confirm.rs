// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Confirmation checkpoint between links

use async_trait::async_trait;
use serde_json::Value;

/// Answer of a confirmation checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort,
}

/// Asked before each link runs when `pause_between_links` is set
#[async_trait]
pub trait Confirm: Send + Sync {
    /// `next` is the link about to run, `previous` the output it will consume
    async fn confirm(&self, next: &str, previous: &Value) -> Decision;
}

#[async_trait]
impl<F> Confirm for F
where
    F: Fn(&str, &Value) -> Decision + Send + Sync,
{
    async fn confirm(&self, next: &str, previous: &Value) -> Decision {
        self(next, previous)
    }
}
