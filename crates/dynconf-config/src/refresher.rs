//! Background polling loop.
//!
//! Every tick fetches a fresh snapshot under a timeout, swaps it into the
//! store when it differs, and rebuilds every registered key from it.

use crate::error::RefreshError;
use crate::provider::Provider;
use crate::registry::{RefreshSummary, Registry};
use crate::sink::ErrorSink;
use crate::store::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The fetch failed or timed out; nothing changed.
    FetchFailed,
    /// The fetched snapshot equals the stored one.
    Unchanged,
    /// The store was swapped and the registry rebuilt.
    Refreshed(RefreshSummary),
}

pub(crate) struct Refresher {
    provider: Arc<dyn Provider>,
    store: Arc<SnapshotStore>,
    registry: Arc<Registry>,
    fetch_timeout: Duration,
    error_sink: Option<ErrorSink>,
    shutdown: CancellationToken,
    // One tick at a time, whether driven by the timer or by `refresh_now`.
    tick_lock: tokio::sync::Mutex<()>,
}

impl Refresher {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        store: Arc<SnapshotStore>,
        registry: Arc<Registry>,
        fetch_timeout: Duration,
        error_sink: Option<ErrorSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            store,
            registry,
            fetch_timeout,
            error_sink,
            shutdown,
            tick_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs one fetch/compare/rebuild cycle.
    ///
    /// Returns `None` without fetching once shutdown was requested, including
    /// when it was requested while this call waited for another tick.
    pub(crate) async fn tick(&self) -> Option<TickOutcome> {
        let _tick = self.tick_lock.lock().await;
        if self.shutdown.is_cancelled() {
            debug!("Refresher is shut down, skipping fetch");
            return None;
        }
        Some(self.fetch_and_rebuild().await)
    }

    async fn fetch_and_rebuild(&self) -> TickOutcome {

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.provider.fetch_config()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                self.report(RefreshError::Fetch(e));
                return TickOutcome::FetchFailed;
            }
            Err(_) => {
                self.report(RefreshError::Timeout(self.fetch_timeout));
                return TickOutcome::FetchFailed;
            }
        };

        let previous = self.store.read();
        if *previous == fetched {
            debug!("Configuration unchanged");
            return TickOutcome::Unchanged;
        }
        let changed = previous.changed_keys(&fetched);
        if !self.store.swap(fetched) {
            return TickOutcome::Unchanged;
        }
        let snapshot = self.store.read();

        info!(
            generation = self.store.generation(),
            changed_keys = ?changed,
            "Configuration changed, rebuilding registered values"
        );
        let summary = self.registry.refresh_all(&snapshot, |e| self.report(e));
        if summary.failed > 0 {
            warn!(
                updated = summary.updated,
                failed = summary.failed,
                "Some configurations kept their previous value"
            );
        } else {
            debug!(updated = summary.updated, "Configuration refresh complete");
        }
        TickOutcome::Refreshed(summary)
    }

    /// Spawns the periodic loop on `runtime`. The first tick fires one
    /// `period` after the call; the loop exits once the shutdown token is
    /// cancelled, letting an in-flight tick finish first.
    pub(crate) fn spawn(self: Arc<Self>, runtime: &Handle, period: Duration) -> JoinHandle<()> {
        runtime.spawn(async move {
            info!(?period, fetch_timeout = ?self.fetch_timeout, "Configuration refresher started");

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if self.tick().await.is_none() {
                    break;
                }
            }

            info!("Configuration refresher stopped");
        })
    }

    fn report(&self, error: RefreshError) {
        warn!(error = %error, "Background configuration refresh error");
        if let Some(sink) = &self.error_sink {
            sink.report(error);
        }
    }
}
