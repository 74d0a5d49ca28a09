// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Bounded fan-out
//!
//! Runs one task per input on a [`JoinSet`], with at most `limit` tasks
//! holding a semaphore permit at once. Results are tagged with their input
//! index and sorted back into input order.

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::errors::ChainflowError;

/// Run `task` once per input, at most `limit` at a time
///
/// The first failing task aborts the remaining ones.
pub async fn fan_out<F, Fut>(
    link: &str,
    limit: usize,
    inputs: Vec<Map<String, Value>>,
    task: F,
) -> Result<Vec<Value>, ChainflowError>
where
    F: Fn(Map<String, Value>) -> Fut,
    Fut: Future<Output = Result<Value, ChainflowError>> + Send + 'static,
{
    let width = inputs.len();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut join_set = JoinSet::new();

    debug!(link, width, limit, "fanning out");

    for (index, input) in inputs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let work = task(input);
        let link = link.to_string();

        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ChainflowError::WorkerFailed {
                    link,
                    message: e.to_string(),
                })?;
            work.await.map(|output| (index, output))
        });
    }

    let mut results = Vec::with_capacity(width);

    while let Some(joined) = join_set.join_next().await {
        let outcome = joined.map_err(|e| ChainflowError::WorkerFailed {
            link: link.to_string(),
            message: format!("task panicked: {}", e),
        })?;

        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                join_set.abort_all();
                return Err(e);
            }
        }
    }

    // Sort by index to preserve input order
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, output)| output).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn inputs(n: i64) -> Vec<Map<String, Value>> {
        (0..n)
            .map(|i| {
                let mut m = Map::new();
                m.insert("i".into(), json!(i));
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        // Later inputs finish first
        let outputs = fan_out("l", 4, inputs(4), |input| async move {
            let i = input["i"].as_i64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40 - 10 * i as u64)).await;
            Ok(json!(i * 10))
        })
        .await
        .unwrap();

        assert_eq!(outputs, vec![json!(0), json!(10), json!(20), json!(30)]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outputs = fan_out("l", 2, inputs(6), |_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
        .await
        .unwrap();

        assert_eq!(outputs.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_first_error_is_returned() {
        let err = fan_out("l", 3, inputs(3), |input| async move {
            if input["i"] == json!(1) {
                Err(ChainflowError::ToolFailed {
                    tool: "t".into(),
                    message: "boom".into(),
                })
            } else {
                Ok(Value::Null)
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ChainflowError::ToolFailed { .. }));
    }
}
