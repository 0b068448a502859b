//! Integration tests for Waypoint
//!
//! These tests drive the dispatcher end to end over scripted backends:
//! - waypoint-core: classification, routing, failover and breaker state
//! - waypoint-llm: backend contract, registry and streaming chunks

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use waypoint_core::{CircuitState, Dispatcher, RouteDefinition, RoutingConfig};
use waypoint_llm::{
    Backend, CompletionRequest, Error, ErrorKind, InMemoryBackendRegistry, Message, Script,
    ScriptedBackend, StreamChunk, TaskCategory,
};

struct Harness {
    openai: Arc<ScriptedBackend>,
    anthropic: Arc<ScriptedBackend>,
    ollama: Arc<ScriptedBackend>,
    dispatcher: Arc<Dispatcher>,
}

fn harness(config: RoutingConfig) -> Harness {
    let openai = Arc::new(ScriptedBackend::new("openai"));
    let anthropic = Arc::new(ScriptedBackend::new("anthropic"));
    let ollama = Arc::new(ScriptedBackend::new("ollama"));
    let registry = InMemoryBackendRegistry::new()
        .with_backend("openai", Arc::clone(&openai) as Arc<dyn Backend>)
        .with_backend("anthropic", Arc::clone(&anthropic) as Arc<dyn Backend>)
        .with_backend("ollama", Arc::clone(&ollama) as Arc<dyn Backend>);
    let dispatcher = assert_ok!(Dispatcher::from_config(&config, Arc::new(registry)));
    Harness {
        openai,
        anthropic,
        ollama,
        dispatcher: Arc::new(dispatcher),
    }
}

/// Default route openai -> ollama, code generation anthropic -> openai,
/// planning on anthropic without fallback
fn config(failure_threshold: u32) -> RoutingConfig {
    let mut config = RoutingConfig {
        default_route: Some(
            RouteDefinition::new("openai", "gpt-4o-mini")
                .with_fallback("ollama", "llama3")
                .with_cost(0.15)
                .with_quality(0.7),
        ),
        ..RoutingConfig::default()
    };
    config.circuit_breaker.failure_threshold = failure_threshold;
    config.circuit_breaker.success_threshold_in_half_open = 1;
    config.circuit_breaker.open_duration_ms = 30_000;
    config.routes.insert(
        TaskCategory::CodeGeneration,
        RouteDefinition::new("anthropic", "claude-sonnet")
            .with_fallback("openai", "gpt-4o")
            .with_cost(3.0)
            .with_quality(0.95),
    );
    config.routes.insert(
        TaskCategory::Planning,
        RouteDefinition::new("anthropic", "claude-opus")
            .with_cost(15.0)
            .with_quality(0.99),
    );
    config
}

fn prompt(text: &str) -> CompletionRequest {
    CompletionRequest::from_prompt(text)
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_hint_overrides_content() {
    let h = harness(config(3));
    let request = CompletionRequest::new()
        .with_message(Message::system("You write code"))
        .with_message(Message::user("implement quicksort"))
        .with_category(TaskCategory::Translation);

    assert_eq!(h.dispatcher.classify(&request), TaskCategory::Translation);
    assert_eq!(h.dispatcher.route(&request).primary_backend, "openai");
}

#[test]
fn test_unmatched_content_is_general() {
    let h = harness(config(3));
    let decision = h.dispatcher.route(&prompt("good morning!"));
    assert_eq!(decision.category, TaskCategory::General);
    assert_eq!(decision.primary_backend, "openai");
    assert_eq!(decision.fallback(), Some(("ollama", "llama3")));
}

// ============================================================================
// Circuit breaker behaviour through the dispatcher
// ============================================================================

#[tokio::test]
async fn test_threshold_opens_circuit_and_skips_primary() {
    let h = harness(config(3));
    let cancel = CancellationToken::new();
    h.anthropic
        .push_failures(3, || Error::Unavailable("503".into()));

    for _ in 0..3 {
        let response = h
            .dispatcher
            .complete(prompt("write a function"), &cancel)
            .await
            .unwrap();
        assert_eq!(response.content, "openai response");
    }
    assert_eq!(h.anthropic.calls(), 3);

    let response = h
        .dispatcher
        .complete(prompt("write a function"), &cancel)
        .await
        .unwrap();
    assert_eq!(response.model, "gpt-4o");
    assert_eq!(h.anthropic.calls(), 3);

    let status = &h.dispatcher.breaker_statuses()[0];
    assert_eq!(status.name, "anthropic->openai");
    assert_eq!(status.state, CircuitState::Open);
    assert_eq!(status.total_requests, 4);
    assert_eq!(status.fallback_used_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_window_and_half_open_close() {
    let h = harness(config(3));
    let cancel = CancellationToken::new();
    h.anthropic
        .push_failures(3, || Error::Network("reset".into()));
    for _ in 0..3 {
        h.dispatcher
            .complete(prompt("refactor this"), &cancel)
            .await
            .unwrap();
    }

    tokio::time::advance(Duration::from_secs(29)).await;
    h.dispatcher
        .complete(prompt("refactor this"), &cancel)
        .await
        .unwrap();
    assert_eq!(h.anthropic.calls(), 3);

    tokio::time::advance(Duration::from_secs(1)).await;
    let response = h
        .dispatcher
        .complete(prompt("refactor this"), &cancel)
        .await
        .unwrap();
    assert_eq!(response.content, "anthropic response");

    let status = &h.dispatcher.breaker_statuses()[0];
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let h = harness(config(1));
    let cancel = CancellationToken::new();
    h.anthropic
        .push_failures(2, || Error::Unavailable("503".into()));

    h.dispatcher.complete(prompt("debug this"), &cancel).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    h.dispatcher.complete(prompt("debug this"), &cancel).await.unwrap();
    assert_eq!(h.anthropic.calls(), 2);
    assert_eq!(h.dispatcher.breaker_statuses()[0].state, CircuitState::Open);

    tokio::time::advance(Duration::from_secs(29)).await;
    h.dispatcher.complete(prompt("debug this"), &cancel).await.unwrap();
    assert_eq!(h.anthropic.calls(), 2);
}

#[tokio::test]
async fn test_no_fallback_fails_fast() {
    let h = harness(config(2));
    let cancel = CancellationToken::new();
    h.anthropic
        .push_failures(2, || Error::Unavailable("503".into()));

    for _ in 0..2 {
        let err = h
            .dispatcher
            .complete(prompt("plan the roadmap"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    for _ in 0..5 {
        let err = h
            .dispatcher
            .complete(prompt("plan the roadmap"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitOpenFastFail);
    }
    assert_eq!(h.anthropic.calls(), 2);
}

#[tokio::test]
async fn test_failover_error_carries_fallback_error() {
    let h = harness(config(5));
    let cancel = CancellationToken::new();
    h.openai.push(Script::Fail(Error::Unavailable("503".into())));
    h.ollama.push(Script::Fail(Error::RateLimit));

    let err = h
        .dispatcher
        .complete(prompt("hello"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Failover { .. }));
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert!(err.to_string().contains("failover from openai to ollama"));
}

#[tokio::test]
async fn test_cancellation_does_not_touch_breaker() {
    let h = harness(config(3));
    let cancel = CancellationToken::new();
    h.openai.push(Script::Fail(Error::Unavailable("503".into())));
    h.dispatcher.complete(prompt("hello"), &cancel).await.unwrap();

    h.openai.push(Script::Hang);
    let task = {
        let dispatcher = Arc::clone(&h.dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.complete(prompt("hello"), &cancel).await })
    };
    while h.openai.calls() < 2 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CancellationRequested);
    let status = &h.dispatcher.breaker_statuses()[0];
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.consecutive_successes, 0);
    assert_eq!(h.ollama.calls(), 1);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_stream_preserves_order_without_buffering() {
    let h = harness(config(3));
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    h.openai.push(Script::Channel(rx));

    let mut stream = h
        .dispatcher
        .stream_complete(prompt("hello"), &cancel)
        .await
        .unwrap();

    // Each chunk is observable before the next one is produced
    for delta in ["a", "b", "c"] {
        tx.send(Ok(StreamChunk::text(delta))).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().delta, delta);
    }
    drop(tx);
    assert!(stream.next().await.is_none());
    assert_eq!(h.dispatcher.breaker_statuses()[0].consecutive_failures, 0);
}

#[tokio::test]
async fn test_stream_partial_failure_is_not_restarted() {
    let h = harness(config(3));
    let cancel = CancellationToken::new();
    h.openai.push(Script::Stream(vec![
        Ok(StreamChunk::text("Hel")),
        Ok(StreamChunk::text("lo")),
        Err(Error::Network("connection reset".into())),
    ]));

    let items: Vec<_> = h
        .dispatcher
        .stream_complete(prompt("hello"), &cancel)
        .await
        .unwrap()
        .collect()
        .await;

    let text: String = items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|chunk| chunk.delta.as_str())
        .collect();
    assert_eq!(text, "Hello");
    assert!(items.last().unwrap().is_err());
    assert_eq!(h.ollama.calls(), 0);
    assert_eq!(h.dispatcher.breaker_statuses()[0].consecutive_failures, 1);
}

// ============================================================================
// Strategies and flags
// ============================================================================

#[tokio::test]
async fn test_cost_optimized_prefers_free_route() {
    let mut config = config(3);
    config.strategy = "cost_optimized".to_string();
    config.required_quality = Some(0.7);
    config.routes.insert(
        TaskCategory::Summarization,
        RouteDefinition::new("openai", "gpt-4o")
            .with_cost(0.03)
            .with_quality(0.9)
            .with_alternative(
                RouteDefinition::new("ollama", "llama3")
                    .with_cost(0.0)
                    .with_quality(0.75),
            ),
    );
    let h = harness(config);
    let cancel = CancellationToken::new();

    let request = prompt("summarize the meeting notes");
    let decision = h.dispatcher.route(&request);
    assert_eq!(decision.primary_backend, "ollama");
    assert_eq!(decision.estimated_cost, Some(0.0));

    let response = h.dispatcher.complete(request, &cancel).await.unwrap();
    assert_eq!(response.content, "ollama response");
    assert_eq!(h.openai.calls(), 0);
}

#[tokio::test]
async fn test_fallback_disabled_surfaces_primary_error() {
    let mut config = config(3);
    config.enable_provider_fallback = false;
    let h = harness(config);
    let cancel = CancellationToken::new();
    h.openai.push(Script::Fail(Error::Unavailable("503".into())));

    let err = h
        .dispatcher
        .complete(prompt("hello"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert_eq!(h.ollama.calls(), 0);
    assert_eq!(h.dispatcher.breaker_statuses()[0].name, "openai");
}

#[test]
fn test_invalid_config_lists_every_problem() {
    let mut config = config(0);
    config.default_route = None;
    config.strategy = "fastest".to_string();

    let registry = Arc::new(InMemoryBackendRegistry::new());
    let err = Dispatcher::from_config(&config, registry).err().unwrap();
    let messages = err.messages();
    assert!(messages.contains(&"default_route is missing".to_string()));
    assert!(messages.iter().any(|m| m.contains("failure_threshold")));
    assert!(messages.iter().any(|m| m.contains("fastest")));
}
