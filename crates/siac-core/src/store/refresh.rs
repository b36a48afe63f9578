// ── Snapshot application ──
//
// Full-list refreshes from the fetcher. Each incoming record is reconciled
// like any other write; keys missing from the list are dropped unless a
// newer push or optimistic write is still holding them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::collection::{EntityCollection, UpsertOutcome};
use super::data_store::DataStore;
use crate::backend::Snapshot;
use crate::model::{Entity, Record, Source, TelemetryReading};

/// What a snapshot did to a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Keys whose current record is newer than the snapshot.
    pub stale: usize,
    pub removed: usize,
    /// Keys absent from the snapshot but kept because they are newer.
    pub retained: usize,
    /// Repeated keys within the snapshot; the first occurrence is used.
    pub duplicates: usize,
}

impl SnapshotDiff {
    /// Number of change notifications the snapshot produced.
    pub fn changes(&self) -> usize {
        self.inserted + self.updated + self.removed
    }

    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

impl<T: Entity> EntityCollection<T> {
    /// Reconcile the full server list, fetched at `fetched_at`.
    ///
    /// Every value is written as a snapshot record. Keys not in `values`
    /// are removed if their record came from a snapshot or is not newer
    /// than `fetched_at`. Subscribers see one snapshot rebuild at the end.
    pub fn replace_snapshot(&self, values: Vec<T>, fetched_at: DateTime<Utc>) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();
        let mut incoming = HashSet::with_capacity(values.len());
        let mut changes = Vec::new();

        for value in values {
            if !incoming.insert(value.key()) {
                diff.duplicates += 1;
                continue;
            }
            let applied = self.write(Record::snapshot(value, fetched_at), false);
            match applied.outcome {
                UpsertOutcome::Inserted => diff.inserted += 1,
                UpsertOutcome::Updated => diff.updated += 1,
                UpsertOutcome::Unchanged => diff.unchanged += 1,
                UpsertOutcome::Stale => diff.stale += 1,
            }
            changes.extend(applied.change);
        }

        for key in self.key_set() {
            if incoming.contains(&key) {
                continue;
            }
            let removed = self.remove_if(&key, |record| {
                record.source == Source::Snapshot || record.last_updated <= fetched_at
            });
            match removed {
                Some(change) => {
                    diff.removed += 1;
                    changes.push(change);
                }
                None => diff.retained += 1,
            }
        }

        self.publish(changes);
        self.prune_deleted(fetched_at);
        debug!(kind = %T::KIND, ?diff, "snapshot applied");
        diff
    }
}

impl DataStore {
    /// Apply a fetched snapshot and record the refresh time.
    pub fn apply_snapshot(&self, snapshot: Snapshot, fetched_at: DateTime<Utc>) -> SnapshotDiff {
        let resource = snapshot.resource();
        let diff = match snapshot {
            Snapshot::Devices(devices) => self.devices.replace_snapshot(devices, fetched_at),
            Snapshot::Alerts(alerts) => self.alerts.replace_snapshot(alerts, fetched_at),
            Snapshot::Telemetry(readings) => self
                .telemetry
                .replace_snapshot(latest_per_device(readings), fetched_at),
            Snapshot::Intrusions(events) => self.intrusions.replace_snapshot(events, fetched_at),
            Snapshot::Summary(summary) => {
                let existed = self.summary().is_some();
                let changed = self.set_summary(summary);
                SnapshotDiff {
                    inserted: usize::from(changed && !existed),
                    updated: usize::from(changed && existed),
                    unchanged: usize::from(!changed),
                    ..SnapshotDiff::default()
                }
            }
        };
        self.mark_refreshed(resource, fetched_at);
        diff
    }
}

/// The telemetry endpoint returns a time series; the store keeps one
/// reading per device, the newest.
fn latest_per_device(readings: Vec<TelemetryReading>) -> Vec<TelemetryReading> {
    let mut latest: HashMap<String, TelemetryReading> = HashMap::with_capacity(readings.len());
    for reading in readings {
        match latest.get(&reading.device_id) {
            Some(kept) if kept.timestamp >= reading.timestamp => {}
            _ => {
                latest.insert(reading.device_id.clone(), reading);
            }
        }
    }
    latest.into_values().collect()
}
