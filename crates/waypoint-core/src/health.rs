//! Periodic backend health probe
//!
//! Optional background task that asks every registered backend whether it
//! is available and logs changes. It only observes: breaker state is driven
//! by real traffic, never by the probe.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waypoint_llm::BackendRegistry;

/// Availability of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    /// Registered backend name
    pub name: String,
    /// Last reported availability
    pub available: bool,
}

/// Ask every registered backend once, in name order
pub async fn probe_backends(
    registry: &dyn BackendRegistry,
    cancel: &CancellationToken,
) -> Vec<BackendHealth> {
    let mut results = Vec::new();
    for name in registry.names() {
        let Some(backend) = registry.resolve(&name) else {
            continue;
        };
        let available = backend.is_available(cancel).await;
        results.push(BackendHealth { name, available });
    }
    results
}

/// Handle to a running health probe
pub struct HealthProbe {
    statuses: Arc<DashMap<String, bool>>,
    rounds: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

impl HealthProbe {
    /// Start probing every `interval` until `cancel` fires
    ///
    /// The first round runs immediately.
    #[must_use]
    pub fn spawn(
        registry: Arc<dyn BackendRegistry>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let statuses: Arc<DashMap<String, bool>> = Arc::new(DashMap::new());
        let (rounds_tx, rounds) = watch::channel(0);
        let handle = tokio::spawn(run(
            registry,
            interval,
            cancel,
            Arc::clone(&statuses),
            rounds_tx,
        ));
        info!(interval_secs = interval.as_secs(), "Health probe started");
        Self {
            statuses,
            rounds,
            handle,
        }
    }

    /// Wait until one full round has been recorded
    ///
    /// Returns early if the probe stopped before finishing a round.
    pub async fn first_round(&self) {
        let mut rounds = self.rounds.clone();
        if rounds.wait_for(|completed| *completed > 0).await.is_err() {
            debug!("Health probe stopped before completing a round");
        }
    }

    /// Latest known availability, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> Vec<BackendHealth> {
        let mut snapshot: Vec<BackendHealth> = self
            .statuses
            .iter()
            .map(|entry| BackendHealth {
                name: entry.key().clone(),
                available: *entry.value(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    /// Wait for the probe task to finish after cancellation
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Health probe task ended abnormally");
        }
    }
}

async fn run(
    registry: Arc<dyn BackendRegistry>,
    interval: Duration,
    cancel: CancellationToken,
    statuses: Arc<DashMap<String, bool>>,
    rounds: watch::Sender<u64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Health probe stopping");
                break;
            }
            _ = ticker.tick() => {}
        }

        for health in probe_backends(registry.as_ref(), &cancel).await {
            let previous = statuses.insert(health.name.clone(), health.available);
            match (previous, health.available) {
                (Some(before), now) if before == now => {}
                (_, true) => info!(backend = %health.name, "Backend available"),
                (_, false) => warn!(backend = %health.name, "Backend unavailable"),
            }
        }
        rounds.send_modify(|completed| *completed += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_llm::{Backend, InMemoryBackendRegistry, ScriptedBackend};

    fn registry() -> (Arc<ScriptedBackend>, Arc<dyn BackendRegistry>) {
        let flaky = Arc::new(ScriptedBackend::new("flaky"));
        let registry = InMemoryBackendRegistry::new()
            .with_backend("flaky", Arc::clone(&flaky) as Arc<dyn Backend>)
            .with_backend("steady", Arc::new(ScriptedBackend::new("steady")));
        (flaky, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_probe_backends_reports_each_backend() {
        let (flaky, registry) = registry();
        flaky.set_available(false);

        let results = probe_backends(registry.as_ref(), &CancellationToken::new()).await;
        assert_eq!(
            results,
            vec![
                BackendHealth { name: "flaky".into(), available: false },
                BackendHealth { name: "steady".into(), available: true },
            ]
        );
        assert_eq!(flaky.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_round_fills_snapshot() {
        let (flaky, registry) = registry();
        flaky.set_available(false);
        let cancel = CancellationToken::new();
        let probe = HealthProbe::spawn(registry, Duration::from_secs(3600), cancel.clone());

        probe.first_round().await;
        cancel.cancel();
        assert_eq!(
            probe.snapshot(),
            vec![
                BackendHealth { name: "flaky".into(), available: false },
                BackendHealth { name: "steady".into(), available: true },
            ]
        );
        probe.join().await;
    }

    #[tokio::test]
    async fn test_first_round_returns_when_stopped_early() {
        let (_, registry) = registry();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let probe = HealthProbe::spawn(registry, Duration::from_secs(3600), cancel);

        probe.first_round().await;
        probe.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_tracks_changes_until_cancelled() {
        let (flaky, registry) = registry();
        let cancel = CancellationToken::new();
        let probe = HealthProbe::spawn(registry, Duration::from_secs(10), cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(probe.snapshot().iter().all(|h| h.available));

        flaky.set_available(false);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = probe.snapshot();
        assert_eq!(snapshot[0].name, "flaky");
        assert!(!snapshot[0].available);
        assert!(snapshot[1].available);

        cancel.cancel();
        probe.join().await;
    }
}
