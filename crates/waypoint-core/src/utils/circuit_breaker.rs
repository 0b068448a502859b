//! Circuit Breaker pattern implementation
//!
//! Provides fault tolerance by keeping traffic away from a failing backend.
//! The circuit breaker has three states:
//! - Closed: Normal operation, requests go to the primary
//! - Open: Failures reached the threshold, requests skip the primary
//! - HalfOpen: Cool-down elapsed, a limited number of probes decide recovery
//!
//! Every decision read and every outcome write happens under one mutex, so
//! concurrent requests against the same breaker never lose a count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use waypoint_llm::{Error, ErrorKind};


/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation - requests go to the primary
    Closed,
    /// Failures exceeded threshold - primary is skipped
    Open,
    /// Testing recovery - limited probes reach the primary
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from open to half-open
    pub open_duration: Duration,
    /// Deadline for a single backend attempt
    pub request_timeout: Duration,
    /// Number of successful probes in half-open state to close the circuit
    pub success_threshold_in_half_open: u32,
    /// Whether a timeout counts as a failure
    pub count_timeouts_as_failures: bool,
    /// Whether a rate-limit response counts as a failure
    pub count_rate_limits_as_failures: bool,
    /// Probes allowed in flight at once while half-open
    pub max_concurrent_probes_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            success_threshold_in_half_open: 2,
            count_timeouts_as_failures: true,
            count_rate_limits_as_failures: false,
            max_concurrent_probes_in_half_open: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open
    #[must_use]
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set success threshold for half-open state
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold_in_half_open = threshold;
        self
    }

    /// Count timeouts as failures
    #[must_use]
    pub fn with_count_timeouts(mut self, count: bool) -> Self {
        self.count_timeouts_as_failures = count;
        self
    }

    /// Count rate limits as failures
    #[must_use]
    pub fn with_count_rate_limits(mut self, count: bool) -> Self {
        self.count_rate_limits_as_failures = count;
        self
    }

    /// Set the half-open probe limit
    #[must_use]
    pub fn with_max_probes(mut self, probes: u32) -> Self {
        self.max_concurrent_probes_in_half_open = probes;
        self
    }

    /// Whether `error` should move the failure counters
    #[must_use]
    pub fn counts_as_failure(&self, error: &Error) -> bool {
        match error.kind() {
            ErrorKind::Timeout => self.count_timeouts_as_failures,
            ErrorKind::RateLimited => self.count_rate_limits_as_failures,
            ErrorKind::CancellationRequested => false,
            ErrorKind::BackendUnavailable
            | ErrorKind::CircuitOpenFastFail
            | ErrorKind::Configuration => true,
        }
    }
}

/// Point-in-time snapshot of a breaker, for observability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    /// Breaker name (the primary/fallback pair)
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures since the last success or close
    pub consecutive_failures: u32,
    /// Consecutive successes in the current half-open window
    pub consecutive_successes: u32,
    /// Wall-clock time of the last counted failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the last state transition (or creation)
    pub last_state_change_at: DateTime<Utc>,
    /// Requests dispatched through this breaker
    pub total_requests: u64,
    /// Requests that were sent to the fallback
    pub fallback_used_count: u64,
    /// Half-open probes currently in flight
    pub in_flight_probes: u32,
    /// `consecutive_failures / total_requests`
    pub failure_rate: f64,
    /// `fallback_used_count / total_requests`
    pub fallback_rate: f64,
}

/// Decision for one request
#[derive(Debug)]
pub enum Admission {
    /// Call the primary, then report the outcome through the guard
    Attempt(AttemptGuard),
    /// Skip the primary (open circuit or probe limit reached)
    Bypass,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change: Instant,
    last_state_change_at: DateTime<Utc>,
    total_requests: u64,
    fallback_used_count: u64,
    in_flight_probes: u32,
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        state.last_state_change = Instant::now();
        state.last_state_change_at = Utc::now();
        state.generation += 1;
        state.consecutive_successes = 0;
        state.in_flight_probes = 0;
        if to == CircuitState::Closed {
            state.consecutive_failures = 0;
        }
        info!(
            name = %self.name,
            from = %from,
            to = %to,
            failures = state.consecutive_failures,
            "Circuit breaker state changed"
        );
    }

    fn on_success(&self, state: &mut BreakerState) {
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                debug!(
                    name = %self.name,
                    successes = state.consecutive_successes,
                    threshold = self.config.success_threshold_in_half_open,
                    "Circuit breaker success in half-open state"
                );
                if state.consecutive_successes >= self.config.success_threshold_in_half_open {
                    self.transition(state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, state: &mut BreakerState) {
        state.last_failure_at = Some(Utc::now());
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                debug!(
                    name = %self.name,
                    failures = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
                if state.consecutive_failures >= self.config.failure_threshold {
                    self.transition(state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                state.consecutive_failures += 1;
                warn!(
                    name = %self.name,
                    "Circuit breaker probe failed in half-open state, reopening"
                );
                self.transition(state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }
}

/// Outcome reporter for one admitted attempt
///
/// Dropping the guard without reporting releases a half-open probe slot and
/// leaves every counter untouched, which is how cancellation is handled.
#[derive(Debug)]
pub struct AttemptGuard {
    shared: Arc<Shared>,
    generation: u64,
    probe: bool,
    finished: bool,
}

impl AttemptGuard {
    /// Whether this attempt is a half-open probe
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report a successful attempt
    pub fn record_success(mut self) {
        self.finish(Some(true));
    }

    /// Report a failed attempt
    pub fn record_failure(mut self) {
        self.finish(Some(false));
    }

    /// Report an attempt that ended with `error`
    ///
    /// Cancellations, and timeouts or rate limits the config does not count,
    /// only release the attempt.
    pub fn record_error(mut self, error: &Error) {
        if self.shared.config.counts_as_failure(error) {
            self.finish(Some(false));
        } else {
            debug!(
                name = %self.shared.name,
                kind = ?error.kind(),
                "Attempt ended without affecting the circuit"
            );
            self.finish(None);
        }
    }

    /// Release the attempt without recording anything
    pub fn release(mut self) {
        self.finish(None);
    }

    fn finish(&mut self, success: Option<bool>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.shared.lock();
        if state.generation != self.generation {
            debug!(name = %self.shared.name, "Ignoring outcome from an earlier circuit state");
            return;
        }
        if self.probe {
            state.in_flight_probes = state.in_flight_probes.saturating_sub(1);
        }
        match success {
            Some(true) => self.shared.on_success(&mut state),
            Some(false) => self.shared.on_failure(&mut state),
            None => {}
        }
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// Circuit breaker for fault tolerance
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let state = BreakerState {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            last_state_change: Instant::now(),
            last_state_change_at: Utc::now(),
            total_requests: 0,
            fallback_used_count: 0,
            in_flight_probes: 0,
            generation: 0,
        };
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.shared.lock().state
    }

    /// Get current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.shared.lock().consecutive_failures
    }

    /// Decide where the next request goes
    ///
    /// Counts the request, moves an expired open circuit to half-open and
    /// claims a probe slot when half-open.
    pub fn admit(&self) -> Admission {
        let mut state = self.shared.lock();
        state.total_requests += 1;

        if state.state == CircuitState::Open
            && state.last_state_change.elapsed() >= self.shared.config.open_duration
        {
            self.shared.transition(&mut state, CircuitState::HalfOpen);
        }

        let current = state.state;
        let probe = match current {
            CircuitState::Closed => false,
            CircuitState::HalfOpen
                if state.in_flight_probes < self.shared.config.max_concurrent_probes_in_half_open =>
            {
                state.in_flight_probes += 1;
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => return Admission::Bypass,
        };

        Admission::Attempt(AttemptGuard {
            shared: Arc::clone(&self.shared),
            generation: state.generation,
            probe,
            finished: false,
        })
    }

    /// Note that a request was sent to the fallback
    pub fn record_fallback(&self) {
        self.shared.lock().fallback_used_count += 1;
    }

    /// Snapshot the current status
    #[must_use]
    pub fn status(&self) -> CircuitBreakerStatus {
        let state = self.shared.lock();
        let ratio = |n: f64| {
            if state.total_requests == 0 {
                0.0
            } else {
                n / state.total_requests as f64
            }
        };
        CircuitBreakerStatus {
            name: self.shared.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            last_failure_at: state.last_failure_at,
            last_state_change_at: state.last_state_change_at,
            total_requests: state.total_requests,
            fallback_used_count: state.fallback_used_count,
            in_flight_probes: state.in_flight_probes,
            failure_rate: ratio(f64::from(state.consecutive_failures)),
            fallback_rate: ratio(state.fallback_used_count as f64),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        if state.state != CircuitState::Closed {
            self.shared.transition(&mut state, CircuitState::Closed);
        }
        state.consecutive_failures = 0;
    }
}
