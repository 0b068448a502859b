//! Breaker-protected primary/fallback pair
//!
//! One [`FailoverBackend`] exists per distinct `(primary, fallback)` pair.
//! It owns the pair's circuit breaker and applies the dispatch rule:
//!
//! - Closed (or an admitted half-open probe): call the primary; on a
//!   non-cancellation failure retry once on the fallback.
//! - Open (or probe limit reached): skip the primary and go straight to the
//!   fallback, or fail fast when there is none.
//!
//! Fallback outcomes never touch the breaker. Caller cancellation never
//! touches it either.

use crate::router::RouteDecision;
use crate::utils::{Admission, AttemptGuard, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use waypoint_llm::{Backend, ChunkStream, CompletionRequest, CompletionResponse, Error, Result, StreamChunk};

struct Endpoint {
    name: String,
    backend: Arc<dyn Backend>,
}

/// Primary backend with optional fallback behind a circuit breaker
pub struct FailoverBackend {
    primary: Endpoint,
    fallback: Option<Endpoint>,
    breaker: CircuitBreaker,
}

/// Breaker name for a pair
#[must_use]
pub fn pair_name(primary: &str, fallback: Option<&str>) -> String {
    match fallback {
        Some(fallback) => format!("{primary}->{fallback}"),
        None => primary.to_string(),
    }
}

impl FailoverBackend {
    /// Create a pair with a fresh, closed breaker
    #[must_use]
    pub fn new(
        primary_name: impl Into<String>,
        primary: Arc<dyn Backend>,
        fallback: Option<(String, Arc<dyn Backend>)>,
        config: CircuitBreakerConfig,
    ) -> Self {
        let primary = Endpoint {
            name: primary_name.into(),
            backend: primary,
        };
        let fallback = fallback.map(|(name, backend)| Endpoint { name, backend });
        let breaker = CircuitBreaker::new(
            pair_name(&primary.name, fallback.as_ref().map(|f| f.name.as_str())),
            config,
        );
        Self {
            primary,
            fallback,
            breaker,
        }
    }

    /// The pair's breaker
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Snapshot of the pair's breaker
    #[must_use]
    pub fn status(&self) -> CircuitBreakerStatus {
        self.breaker.status()
    }

    /// Whether a fallback is configured
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn deadline(&self, route: &RouteDecision) -> Duration {
        let timeout = self.breaker.config().request_timeout;
        route.max_latency.map_or(timeout, |latency| latency.min(timeout))
    }

    fn fast_fail(&self) -> Error {
        debug!(breaker = %self.breaker.name(), "Circuit open without fallback, failing fast");
        Error::CircuitOpen {
            backend: self.primary.name.clone(),
        }
    }

    /// Single-shot completion
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        route: &RouteDecision,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        self.run(route, &route.primary_model, cancel, |backend, model| {
            let request = request.for_model(&model);
            async move { backend.complete(request, cancel).await }
        })
        .await
    }

    /// Embedding; `model` overrides the primary model only
    pub async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        route: &RouteDecision,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let primary_model = model.unwrap_or(&route.primary_model);
        self.run(route, primary_model, cancel, |backend, model| async move {
            backend.embed(text, Some(&model), cancel).await
        })
        .await
    }

    async fn run<T, F, Fut>(
        &self,
        route: &RouteDecision,
        primary_model: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>, String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = self.deadline(route);
        let guard = match self.breaker.admit() {
            Admission::Attempt(guard) => guard,
            Admission::Bypass => {
                return self.run_fallback(route, deadline, cancel, &call, None).await;
            }
        };

        let outcome = bounded(
            call(Arc::clone(&self.primary.backend), primary_model.to_string()),
            deadline,
            cancel,
        )
        .await;

        match outcome {
            Ok(value) => {
                guard.record_success();
                Ok(value)
            }
            Err(err) => {
                guard.record_error(&err);
                if err.is_cancelled() {
                    return Err(err);
                }
                warn!(
                    breaker = %self.breaker.name(),
                    backend = %self.primary.name,
                    error = %err,
                    "Primary backend failed"
                );
                self.run_fallback(route, deadline, cancel, &call, Some(err)).await
            }
        }
    }

    async fn run_fallback<T, F, Fut>(
        &self,
        route: &RouteDecision,
        deadline: Duration,
        cancel: &CancellationToken,
        call: &F,
        primary_error: Option<Error>,
    ) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>, String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempted_primary = primary_error.is_some();
        let Some(fallback) = &self.fallback else {
            return Err(primary_error.unwrap_or_else(|| self.fast_fail()));
        };
        self.breaker.record_fallback();
        warn!(
            breaker = %self.breaker.name(),
            fallback = %fallback.name,
            "Sending request to fallback backend"
        );

        let model = route.fallback_model.clone().unwrap_or_default();
        bounded(call(Arc::clone(&fallback.backend), model), deadline, cancel)
            .await
            .map_err(|err| self.tag_failover(fallback, err, attempted_primary))
    }

    /// Only a fallback reached after a failed primary attempt is tagged;
    /// when the breaker skipped the primary the fallback's error is returned
    /// as is.
    fn tag_failover(&self, fallback: &Endpoint, err: Error, attempted_primary: bool) -> Error {
        if !attempted_primary || err.is_cancelled() {
            err
        } else {
            Error::failover(&self.primary.name, &fallback.name, err)
        }
    }

    /// Streaming completion
    ///
    /// The primary/fallback decision is made once, before the first chunk.
    /// A failure to open the primary stream retries on the fallback; a
    /// failure after the stream opened ends the stream and counts once.
    pub async fn stream_complete(
        &self,
        request: &CompletionRequest,
        route: &RouteDecision,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        let deadline = self.deadline(route);
        let guard = match self.breaker.admit() {
            Admission::Attempt(guard) => guard,
            Admission::Bypass => {
                return self.stream_fallback(request, route, deadline, cancel, None).await;
            }
        };

        let opened = bounded(
            self.primary
                .backend
                .stream_complete(request.for_model(&route.primary_model), cancel),
            deadline,
            cancel,
        )
        .await;

        match opened {
            Ok(stream) => Ok(monitor(stream, Some(guard), deadline, cancel.clone())),
            Err(err) => {
                guard.record_error(&err);
                if err.is_cancelled() {
                    return Err(err);
                }
                warn!(
                    breaker = %self.breaker.name(),
                    backend = %self.primary.name,
                    error = %err,
                    "Primary backend failed to open stream"
                );
                self.stream_fallback(request, route, deadline, cancel, Some(err))
                    .await
            }
        }
    }

    async fn stream_fallback(
        &self,
        request: &CompletionRequest,
        route: &RouteDecision,
        deadline: Duration,
        cancel: &CancellationToken,
        primary_error: Option<Error>,
    ) -> Result<ChunkStream> {
        let attempted_primary = primary_error.is_some();
        let Some(fallback) = &self.fallback else {
            return Err(primary_error.unwrap_or_else(|| self.fast_fail()));
        };
        self.breaker.record_fallback();
        warn!(
            breaker = %self.breaker.name(),
            fallback = %fallback.name,
            "Streaming from fallback backend"
        );

        let model = route.fallback_model.as_deref().unwrap_or_default();
        let opened = bounded(
            fallback.backend.stream_complete(request.for_model(model), cancel),
            deadline,
            cancel,
        )
        .await;
        match opened {
            Ok(stream) => Ok(monitor(stream, None, deadline, cancel.clone())),
            Err(err) => Err(self.tag_failover(fallback, err, attempted_primary)),
        }
    }
}

/// Run `call` until it finishes, the deadline passes or the caller cancels
async fn bounded<T>(
    call: impl Future<Output = Result<T>>,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        outcome = tokio::time::timeout(deadline, call) => {
            outcome.unwrap_or_else(|_| Err(Error::Timeout(as_millis(deadline))))
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

enum Step {
    Item(Result<StreamChunk>),
    Done,
    Stalled,
    Cancelled,
}

/// Forward chunks one at a time and settle the attempt when the stream ends
///
/// Dropping the returned stream early releases the attempt without
/// recording an outcome.
fn monitor(
    mut inner: ChunkStream,
    mut guard: Option<AttemptGuard>,
    idle: Duration,
    cancel: CancellationToken,
) -> ChunkStream {
    async_stream::stream! {
        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Cancelled,
                next = tokio::time::timeout(idle, inner.next()) => match next {
                    Ok(Some(item)) => Step::Item(item),
                    Ok(None) => Step::Done,
                    Err(_) => Step::Stalled,
                },
            };

            match step {
                Step::Item(Ok(chunk)) => yield Ok(chunk),
                Step::Item(Err(err)) => {
                    if let Some(guard) = guard.take() {
                        guard.record_error(&err);
                    }
                    yield Err(err);
                    break;
                }
                Step::Done => {
                    if let Some(guard) = guard.take() {
                        guard.record_success();
                    }
                    break;
                }
                Step::Stalled => {
                    let err = Error::Timeout(as_millis(idle));
                    if let Some(guard) = guard.take() {
                        guard.record_error(&err);
                    }
                    yield Err(err);
                    break;
                }
                Step::Cancelled => {
                    if let Some(guard) = guard.take() {
                        guard.release();
                    }
                    yield Err(Error::Cancelled);
                    break;
                }
            }
        }
    }
    .boxed()
}
