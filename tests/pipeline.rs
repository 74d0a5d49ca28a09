// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! End-to-end runs against an in-process completion backend

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chainflow::executors::MemoryLoader;
use chainflow::{
    ChainflowError, Compiler, Completion, CompletionRequest, Confirm, Decision, Engine,
    EngineConfig, EngineInput, ErrorKind, FanShape, ToolRegistry,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Doubles the trailing number of `each` instructions, echoes everything else
#[derive(Default)]
struct Scripted {
    calls: AtomicUsize,
}

#[async_trait]
impl Completion for Scripted {
    async fn complete(&self, request: CompletionRequest) -> Result<Value, ChainflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if request.link == "each" {
            let n: u64 = request
                .instruction
                .rsplit(' ')
                .next()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            // Earlier elements finish last
            tokio::time::sleep(Duration::from_millis(4u64.saturating_sub(n) * 20)).await;
            return Ok(json!({ "doubled": n * 2 }));
        }

        Ok(json!({ "text": request.instruction }))
    }
}

fn tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register_fn("gen", |_| {
            Ok(Some(json!({ "gen": [{ "x": 1 }, { "x": 2 }, { "x": 3 }] })))
        })
        .register_fn("noop", |_| Ok(None))
        .register_fn("annotate", |_| Ok(Some(json!({ "y": 2 }))))
        .register_fn("broken", |_| Ok(Some(json!("not a map"))))
        .register_fn("uneven", |_| Ok(Some(json!({ "xs": [1, 2, 3], "ys": [1, 2] }))))
        .register_fn("collect", |input| {
            let total: u64 = input
                .get("each")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|i| i["doubled"].as_u64()).sum())
                .unwrap_or(0);
            Ok(Some(json!({ "total": total })))
        });
    registry
}

const FAN_OUT: &str = "\
@tool gen
@chainlink each ||
in:
  - gen.element.x
prompt: Value {gen.element.x}
out:
  doubled: int
@chainlink summary
mask: doubled {doubled}
prompt: \"Summarise: {summary}\"
";

async fn build(source: &str, config: EngineConfig) -> (Engine, Arc<Scripted>) {
    let registry = tools();
    let factory = Compiler::new().with_tools(&registry).compile(source).await.unwrap();
    let backend = Arc::new(Scripted::default());
    let engine = Engine::new(factory, config)
        .unwrap()
        .with_completion(backend.clone())
        .with_tools(registry);
    (engine, backend)
}

#[tokio::test]
async fn test_link_count_matches_directives() {
    let source = "\
# comment lines are skipped
@chainlink first
in: [topic]
prompt: About {topic}

@tool noop
@chainlink third --
prompt: Again {text}
";
    let factory = Compiler::new().compile(source).await.unwrap();
    assert_eq!(factory.link_names(), vec!["first", "noop", "third"]);
}

#[tokio::test]
async fn test_fan_out_keeps_input_order() {
    init_tracing();
    let config = EngineConfig {
        max_parallel_links: 3,
        ..EngineConfig::default()
    };
    let (engine, backend) = build(FAN_OUT, config).await;

    let trace = engine
        .run_traced(EngineInput::new().arg("topic", "tides"))
        .await
        .unwrap();

    assert_eq!(trace.len(), 3);
    assert_eq!(trace[1].shape, FanShape::Parallel);
    assert_eq!(
        trace[1].input,
        json!([
            { "gen$element$x": 1 },
            { "gen$element$x": 2 },
            { "gen$element$x": 3 },
        ])
    );
    assert_eq!(
        trace[1].output,
        json!([{ "doubled": 2 }, { "doubled": 4 }, { "doubled": 6 }])
    );

    assert_eq!(
        trace[2].input,
        json!({ "summary": "(1) doubled 2\n(2) doubled 4\n(3) doubled 6" })
    );
    assert_eq!(
        trace[2].output,
        json!({ "text": "Summarise: (1) doubled 2\n(2) doubled 4\n(3) doubled 6" })
    );

    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_run_returns_last_output() {
    let (engine, _) = build(FAN_OUT, EngineConfig::default()).await;
    let output = engine.run(EngineInput::new().arg("topic", "tides")).await.unwrap();
    assert_eq!(
        output,
        json!({ "text": "Summarise: (1) doubled 2\n(2) doubled 4\n(3) doubled 6" })
    );
}

#[tokio::test]
async fn test_convex_link_needs_mask() {
    let without_mask = "\
@tool gen
@chainlink each ||
in: [gen.element.x]
prompt: Value {gen.element.x}
@chainlink summary
prompt: \"Summarise: {summary}\"
";
    let err = Compiler::new().compile(without_mask).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert_eq!(err.line(), Some(5));

    assert!(Compiler::new().compile(FAN_OUT).await.is_ok());
}

#[tokio::test]
async fn test_uneven_iterables_fail_before_invocation() {
    let source = "\
@tool uneven
@chainlink pairs ||
in:
  - xs.element
  - ys.element
prompt: \"{xs.element} and {ys.element}\"
";
    let (engine, backend) = build(source, EngineConfig::default()).await;

    let err = engine.run(EngineInput::new().arg("seed", 1)).await.unwrap_err();
    match err {
        ChainflowError::IterableLengthMismatch {
            first_len, second_len, ..
        } => {
            assert_eq!(first_len, 3);
            assert_eq!(second_len, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unmatched_inputs_are_a_piping_error() {
    let source = "\
@chainlink first
in: [missing]
prompt: About {missing}
";
    let (engine, backend) = build(source, EngineConfig::default()).await;

    let err = engine.run(EngineInput::new().arg("topic", "tides")).await.unwrap_err();
    assert!(matches!(err, ChainflowError::NoMatchingInputs { ref link, .. } if link == "first"));
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_tool_outputs_merge_over_input() {
    let (engine, _) = build("@tool noop\n", EngineConfig::default()).await;
    let output = engine.run(EngineInput::new().arg("x", 1)).await.unwrap();
    assert_eq!(output, json!({ "x": 1 }));

    let (engine, _) = build("@tool annotate\n", EngineConfig::default()).await;
    let output = engine.run(EngineInput::new().arg("x", 1)).await.unwrap();
    assert_eq!(output, json!({ "x": 1, "y": 2 }));
}

#[tokio::test]
async fn test_extends_prepends_base_links() {
    let base = "\
@chainlink a
def:
  Point:
    x: int
in: [topic]
prompt: A {topic}
@chainlink b
prompt: B {text}
";
    let child = "\
@extends base.chain
@chainlink c
def:
  Segment:
    start: Point
    end: Point
prompt: C {text}
";
    let loader = MemoryLoader::new().with_source("base.chain", base);
    let compiler = Compiler::new().with_loader(Arc::new(loader));

    let factory = compiler.compile(child).await.unwrap();
    assert_eq!(factory.link_names(), vec!["a", "b", "c"]);

    let parent = factory.base.as_deref().unwrap();
    for name in parent.definitions.names() {
        assert!(factory.definitions.contains(name));
    }
    assert!(factory.definitions.contains("Segment"));
    assert!(!parent.definitions.contains("Segment"));
}

#[tokio::test]
async fn test_abort_at_confirmation_keeps_partial_trace() {
    let source = "\
@chainlink first
in: [topic]
prompt: About {topic}
@chainlink second
prompt: More on {text}
";
    let config = EngineConfig {
        pause_between_links: true,
        ..EngineConfig::default()
    };

    let stop_at_second: Arc<dyn Confirm> = Arc::new(|next: &str, _: &Value| {
        if next == "second" {
            Decision::Abort
        } else {
            Decision::Proceed
        }
    });
    let (engine, _) = build(source, config.clone()).await;
    let trace = engine
        .with_confirm(stop_at_second)
        .run_traced(EngineInput::new().arg("topic", "tides"))
        .await
        .unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].link, "first");
    assert_eq!(trace[0].output, json!({ "text": "About tides" }));

    let stop_at_once: Arc<dyn Confirm> = Arc::new(|_: &str, _: &Value| Decision::Abort);
    let (engine, _) = build(source, config).await;
    let err = engine
        .with_confirm(stop_at_once)
        .run(EngineInput::new().arg("topic", "tides"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainflowError::EmptyTrace));
}

#[tokio::test]
async fn test_partial_trace_surfaces_on_failure() {
    let source = "\
@tool noop
@tool broken
";
    let config = EngineConfig {
        surface_partial_trace: true,
        ..EngineConfig::default()
    };
    let (engine, _) = build(source, config).await;

    let err = engine.run(EngineInput::new().arg("x", 1)).await.unwrap_err();
    match err {
        ChainflowError::StageFailed { link, source, trace } => {
            assert_eq!(link, "broken");
            assert!(matches!(*source, ChainflowError::ToolReturnedNonMap { .. }));
            assert_eq!(trace.len(), 1);
            assert_eq!(trace[0].link, "noop");
        }
        other => panic!("unexpected error: {other}"),
    }

    let (engine, _) = build(source, EngineConfig::default()).await;
    let err = engine.run(EngineInput::new().arg("x", 1)).await.unwrap_err();
    assert!(matches!(err, ChainflowError::ToolReturnedNonMap { .. }));
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let (engine, backend) = build("@tool noop\n", EngineConfig::default()).await;
    let err = engine.run(EngineInput::new()).await.unwrap_err();
    assert!(matches!(err, ChainflowError::EmptyInput));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_output_conforms_to_out_record() {
    let source = "\
@chainlink review
in: [topic]
prompt: Review {topic}
out:
  text: str
  score: int = 5
  note: str?
";
    let (engine, _) = build(source, EngineConfig::default()).await;
    let output = engine.run(EngineInput::new().arg("topic", "tides")).await.unwrap();
    assert_eq!(
        output,
        json!({ "text": "Review tides", "score": 5, "note": null })
    );
}

#[tokio::test]
async fn test_parallel_after_parallel_runs_per_element() {
    let source = "\
@tool gen
@chainlink each ||
in: [gen.element.x]
prompt: Value {gen.element.x}
out:
  doubled: int
@chainlink again ||
prompt: Again {doubled}
";
    let (engine, backend) = build(source, EngineConfig::default()).await;

    let trace = engine
        .run_traced(EngineInput::new().arg("topic", "tides"))
        .await
        .unwrap();

    assert_eq!(trace.len(), 3);
    assert_eq!(trace[2].shape, FanShape::Parallel);
    assert_eq!(
        trace[2].input,
        json!([
            { "each$element$doubled": 2 },
            { "each$element$doubled": 4 },
            { "each$element$doubled": 6 },
        ])
    );
    assert_eq!(
        trace[2].output,
        json!([{ "text": "Again 2" }, { "text": "Again 4" }, { "text": "Again 6" }])
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_convex_tool_receives_element_list() {
    let source = "\
@tool gen
@chainlink each ||
in: [gen.element.x]
prompt: Value {gen.element.x}
out:
  doubled: int
@tool collect
in: [doubled]
";
    let (engine, _) = build(source, EngineConfig::default()).await;

    let trace = engine
        .run_traced(EngineInput::new().arg("topic", "tides"))
        .await
        .unwrap();

    assert_eq!(trace.len(), 3);
    assert!(trace[2].is_tool);
    assert_eq!(
        trace[2].input,
        json!({ "each": [{ "doubled": 2 }, { "doubled": 4 }, { "doubled": 6 }] })
    );
    assert_eq!(trace[2].output["total"], json!(12));
}

#[tokio::test]
async fn test_mask_without_resolvable_variables_fails() {
    let source = "\
@tool gen
@chainlink each ||
in: [gen.element.x]
prompt: Value {gen.element.x}
out:
  doubled: int
@chainlink summary
mask: \"{missing}\"
prompt: \"Summarise: {summary}\"
";
    let (engine, backend) = build(source, EngineConfig::default()).await;

    let err = engine.run(EngineInput::new().arg("topic", "tides")).await.unwrap_err();
    assert!(matches!(err, ChainflowError::MaskUnresolved { ref link } if link == "summary"));
    assert_eq!(err.kind(), ErrorKind::Resolution);
    // only the three fan-out calls reached the backend
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}
