// ── Snapshot fetcher ──
//
// Request/response loads of full resource lists into the store, on demand
// or on a per-resource poll schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{Backend, Snapshot};
use crate::error::CoreError;
use crate::model::ResourceKind;
use crate::notice::Notice;
use crate::store::{DataStore, SnapshotDiff};

/// What a [`SnapshotFetcher::refresh`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(SnapshotDiff),
    /// A refresh of the same resource was already in flight.
    Skipped,
    /// The fetcher was invalidated while the request was out.
    Discarded,
}

/// Loads snapshots from a [`Backend`] into the [`DataStore`].
pub struct SnapshotFetcher<B: Backend> {
    backend: Arc<B>,
    store: Arc<DataStore>,
    in_flight: DashSet<ResourceKind>,
    generation: AtomicU64,
    notices: broadcast::Sender<Notice>,
}

/// Clears the in-flight mark when the refresh ends or is dropped.
struct InFlight<'a> {
    set: &'a DashSet<ResourceKind>,
    resource: ResourceKind,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.resource);
    }
}

impl<B: Backend> SnapshotFetcher<B> {
    pub fn new(backend: Arc<B>, store: Arc<DataStore>, notices: broadcast::Sender<Notice>) -> Self {
        Self {
            backend,
            store,
            in_flight: DashSet::new(),
            generation: AtomicU64::new(0),
            notices,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Fetch the full list for `resource` without touching the store.
    pub async fn fetch_all(&self, resource: ResourceKind) -> Result<Snapshot, CoreError> {
        self.backend.fetch(resource).await
    }

    /// Fetch `resource` and reconcile it into the store.
    ///
    /// On failure the store keeps its current data, a
    /// [`Notice::FetchFailed`] is broadcast, and the error is returned.
    pub async fn refresh(&self, resource: ResourceKind) -> Result<RefreshOutcome, CoreError> {
        if !self.in_flight.insert(resource) {
            debug!(%resource, "refresh already in flight, skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            resource,
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let fetched_at = Utc::now();
        let result = self.backend.fetch(resource).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(%resource, "discarding snapshot from an invalidated generation");
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(snapshot) => {
                debug!(%resource, rows = snapshot.len(), "snapshot fetched");
                Ok(RefreshOutcome::Applied(
                    self.store.apply_snapshot(snapshot, fetched_at),
                ))
            }
            Err(e) => {
                warn!(%resource, error = %e, "snapshot fetch failed, keeping previous data");
                let _ = self.notices.send(Notice::FetchFailed {
                    resource,
                    message: e.to_string(),
                });
                Err(match e {
                    auth @ CoreError::AuthenticationFailed { .. } => auth,
                    other => CoreError::Fetch {
                        resource: resource.to_string(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    /// Make every response to a request already in flight stale.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Refresh `resource` every `interval` until `cancel` fires. The first
    /// tick is one interval from now; missed ticks are skipped.
    pub fn spawn_schedule(
        self: Arc<Self>,
        resource: ResourceKind,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(%resource, ?interval, "poll schedule started");

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = self.refresh(resource) => {
                        if let Err(e) = result {
                            debug!(%resource, error = %e, "scheduled refresh failed");
                        }
                    }
                }
            }

            debug!(%resource, "poll schedule stopped");
        })
    }
}
