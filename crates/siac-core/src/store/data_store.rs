// ── Central reactive data store ──
//
// One reconciled collection per entity kind, the dashboard summary, and
// connection/refresh metadata. Mutations are broadcast via `watch`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use siac_api::ConnectionState;
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{
    Alert, DashboardSummary, Device, Entity, IntrusionEvent, ResourceKind, TelemetryReading,
};
use crate::stream::EntityStream;

/// The view-model every consumer reads from.
///
/// Reads are lock-free snapshots; writes take a per-key `DashMap` entry
/// lock so a compare-and-store on one key is atomic.
pub struct DataStore {
    pub(crate) devices: EntityCollection<Device>,
    pub(crate) alerts: EntityCollection<Alert>,
    pub(crate) telemetry: EntityCollection<TelemetryReading>,
    pub(crate) intrusions: EntityCollection<IntrusionEvent>,
    pub(crate) summary: watch::Sender<Option<Arc<DashboardSummary>>>,
    pub(crate) connection: watch::Sender<ConnectionState>,
    pub(crate) last_refresh: DashMap<ResourceKind, DateTime<Utc>>,
    pub(crate) last_push_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        let (summary, _) = watch::channel(None);
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (last_push_event, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            alerts: EntityCollection::new(),
            telemetry: EntityCollection::new(),
            intrusions: EntityCollection::new(),
            summary,
            connection,
            last_refresh: DashMap::new(),
            last_push_event,
        }
    }

    /// Typed access to the collection for `E`.
    pub fn collection<E: Entity>(&self) -> &EntityCollection<E> {
        E::collection(self)
    }

    pub fn devices(&self) -> &EntityCollection<Device> {
        &self.devices
    }

    pub fn alerts(&self) -> &EntityCollection<Alert> {
        &self.alerts
    }

    pub fn telemetry(&self) -> &EntityCollection<TelemetryReading> {
        &self.telemetry
    }

    pub fn intrusions(&self) -> &EntityCollection<IntrusionEvent> {
        &self.intrusions
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn alerts_snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.alerts.snapshot()
    }

    pub fn telemetry_snapshot(&self) -> Arc<Vec<Arc<TelemetryReading>>> {
        self.telemetry.snapshot()
    }

    pub fn intrusions_snapshot(&self) -> Arc<Vec<Arc<IntrusionEvent>>> {
        self.intrusions.snapshot()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_devices(&self) -> EntityStream<Device> {
        self.devices.subscribe()
    }

    pub fn subscribe_alerts(&self) -> EntityStream<Alert> {
        self.alerts.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> EntityStream<TelemetryReading> {
        self.telemetry.subscribe()
    }

    pub fn subscribe_intrusions(&self) -> EntityStream<IntrusionEvent> {
        self.intrusions.subscribe()
    }

    // ── Summary ──────────────────────────────────────────────────────

    pub fn summary(&self) -> Option<Arc<DashboardSummary>> {
        self.summary.borrow().clone()
    }

    pub fn subscribe_summary(&self) -> watch::Receiver<Option<Arc<DashboardSummary>>> {
        self.summary.subscribe()
    }

    /// Replace the summary. Returns `false` (and notifies nobody) when the
    /// value is unchanged.
    pub fn set_summary(&self, summary: DashboardSummary) -> bool {
        self.summary.send_if_modified(|current| {
            if current.as_deref() == Some(&summary) {
                return false;
            }
            *current = Some(Arc::new(summary));
            true
        })
    }

    // ── Connection state ─────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        self.connection.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// When `resource` was last successfully applied from a snapshot.
    pub fn last_refresh(&self, resource: ResourceKind) -> Option<DateTime<Utc>> {
        self.last_refresh.get(&resource).map(|at| *at)
    }

    pub(crate) fn mark_refreshed(&self, resource: ResourceKind, at: DateTime<Utc>) {
        self.last_refresh
            .entry(resource)
            .and_modify(|prev| *prev = (*prev).max(at))
            .or_insert(at);
    }

    /// Receipt time of the last stream event applied.
    pub fn last_push_event(&self) -> Option<DateTime<Utc>> {
        *self.last_push_event.borrow()
    }

    /// Time since the last stream event, if any arrived.
    pub fn push_event_age(&self) -> Option<chrono::Duration> {
        self.last_push_event().map(|at| Utc::now() - at)
    }
}
