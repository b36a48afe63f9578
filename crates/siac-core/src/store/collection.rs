// ── Reconciling entity collection ──
//
// Keyed storage where every write goes through the recency/source rule.
// Per-key atomicity comes from `DashMap` entry locking; subscribers get a
// rebuilt snapshot on a `watch` channel plus per-key change callbacks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::trace;

use crate::model::{Entity, Record, Source};
use crate::stream::{ChangeFeed, EntityStream};

// ── Change notifications ─────────────────────────────────────────────

/// A change to the resolved value of one key.
#[derive(Debug, Clone)]
pub enum EntityChange<T> {
    Upserted {
        key: String,
        value: Arc<T>,
        previous: Option<Arc<T>>,
    },
    Removed {
        key: String,
        previous: Arc<T>,
    },
}

impl<T> EntityChange<T> {
    pub fn key(&self) -> &str {
        match self {
            Self::Upserted { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// The value after the change, `None` for removals.
    pub fn current(&self) -> Option<&Arc<T>> {
        match self {
            Self::Upserted { value, .. } => Some(value),
            Self::Removed { .. } => None,
        }
    }
}

/// What a single write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New key.
    Inserted,
    /// Existing key, value changed.
    Updated,
    /// The record won but the value is identical; metadata refreshed only.
    Unchanged,
    /// The current record is newer (or ties with higher priority); dropped.
    Stale,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

type Handler<T> = Arc<dyn Fn(&EntityChange<T>) + Send + Sync>;

struct Handlers<T> {
    next_id: AtomicU64,
    entries: DashMap<u64, Handler<T>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: 'static> Detach for Handlers<T> {
    fn detach(&self, id: u64) {
        self.entries.remove(&id);
    }
}

/// Handle for a change handler registered with
/// [`EntityCollection::on_change`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    handlers: Weak<dyn Detach>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── Collection ───────────────────────────────────────────────────────

pub(crate) struct Applied<T> {
    pub outcome: UpsertOutcome,
    pub change: Option<EntityChange<T>>,
    pub revision: u64,
    pub prior: Option<Record<T>>,
}

/// One reconciled collection per entity kind.
pub struct EntityCollection<T: Entity> {
    records: DashMap<String, Record<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
    handlers: Arc<Handlers<T>>,
    next_revision: AtomicU64,
    /// Deletion time of keys removed by the backend. Snapshots fetched
    /// before that time may not bring the key back.
    deleted: DashMap<String, DateTime<Utc>>,
}

impl<T: Entity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityCollection<T> {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: DashMap::new(),
            snapshot,
            handlers: Arc::new(Handlers {
                next_id: AtomicU64::new(1),
                entries: DashMap::new(),
            }),
            next_revision: AtomicU64::new(1),
            deleted: DashMap::new(),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.records.get(key).map(|r| Arc::clone(&r.value().value))
    }

    /// The stored record including reconciliation metadata.
    pub fn record(&self, key: &str) -> Option<Record<T>> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Current values ordered by key (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> EntityStream<T> {
        EntityStream::new(self.snapshot.subscribe())
    }

    /// Queue of changes from now on; see [`ChangeFeed`].
    pub fn changes(&self) -> ChangeFeed<T> {
        ChangeFeed::new(self)
    }

    /// Call `handler` for every change to a resolved value. Writes that
    /// lose reconciliation or leave the value equal are not reported.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EntityChange<T>) + Send + Sync + 'static,
    {
        let id = self.handlers.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.entries.insert(id, Arc::new(handler));
        let handlers: Weak<Handlers<T>> = Arc::downgrade(&self.handlers);
        Subscription { id, handlers }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Store `record` if it strictly wins over the current one.
    pub fn upsert(&self, record: Record<T>) -> UpsertOutcome {
        let applied = self.write(record, false);
        self.publish(applied.change.into_iter().collect());
        applied.outcome
    }

    /// Reconcile a partial update: `build` receives the current value (if
    /// any) and returns the full new value for `key`. Not called when the
    /// write would lose.
    pub fn upsert_with<F>(
        &self,
        key: &str,
        last_updated: DateTime<Utc>,
        source: Source,
        build: F,
    ) -> UpsertOutcome
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let applied = self.write_entry(key.to_owned(), last_updated, source, false, |current| {
            Arc::new(build(current.map(AsRef::as_ref)))
        });
        self.publish(applied.change.into_iter().collect());
        applied.outcome
    }

    /// Remove `key` unconditionally.
    pub fn remove(&self, key: &str) -> Option<Record<T>> {
        let (key, removed) = self.records.remove(key)?;
        self.publish(vec![EntityChange::Removed {
            key,
            previous: Arc::clone(&removed.value),
        }]);
        Some(removed)
    }

    /// Remove `key` because the backend deleted it at `at`. Unlike
    /// [`remove`](Self::remove), a snapshot fetched before `at` will not
    /// re-insert the key.
    pub fn delete_at(&self, key: &str, at: DateTime<Utc>) -> Option<Record<T>> {
        self.deleted
            .entry(key.to_owned())
            .and_modify(|seen| *seen = (*seen).max(at))
            .or_insert(at);
        self.remove(key)
    }

    /// Forget deletions a snapshot fetched at `fetched_at` already reflects.
    pub(crate) fn prune_deleted(&self, fetched_at: DateTime<Utc>) {
        self.deleted.retain(|_, at| *at >= fetched_at);
    }

    /// Write a backend-confirmed value. Always wins; tagged as push and
    /// stamped now.
    pub fn confirm(&self, value: T) -> UpsertOutcome {
        let applied = self.write(Record::push(value, Utc::now()), true);
        self.publish(applied.change.into_iter().collect());
        applied.outcome
    }

    /// Write an optimistic value unconditionally, stamped now. Returns the
    /// new revision and the record it displaced.
    pub fn apply_optimistic(&self, value: T) -> (u64, Option<Record<T>>) {
        let record = Record::new(value, Utc::now(), Source::Optimistic);
        let applied = self.write(record, true);
        self.publish(applied.change.into_iter().collect());
        (applied.revision, applied.prior)
    }

    /// Undo an optimistic write, but only while it is still current.
    ///
    /// `revision` is the optimistic record's revision, or `None` when the
    /// optimistic write was a removal (then the key must still be absent).
    /// `prior` is reinstated, or the key removed if there was none.
    /// Returns `true` if anything was reverted.
    pub fn restore(&self, key: &str, revision: Option<u64>, prior: Option<Record<T>>) -> bool {
        let change = match self.records.entry(key.to_owned()) {
            Entry::Occupied(slot) => {
                if revision != Some(slot.get().revision) {
                    return false;
                }
                match prior {
                    Some(prior) => {
                        let restored = Arc::clone(&prior.value);
                        let (key, replaced) = {
                            let mut slot = slot;
                            let replaced = slot.insert(prior);
                            (slot.key().clone(), replaced)
                        };
                        (*replaced.value != *restored).then(|| EntityChange::Upserted {
                            key,
                            value: restored,
                            previous: Some(replaced.value),
                        })
                    }
                    None => {
                        let (key, removed) = slot.remove_entry();
                        Some(EntityChange::Removed {
                            key,
                            previous: removed.value,
                        })
                    }
                }
            }
            Entry::Vacant(slot) => {
                if revision.is_some() {
                    return false;
                }
                let Some(prior) = prior else {
                    return false;
                };
                let value = Arc::clone(&prior.value);
                let key = slot.key().clone();
                slot.insert(prior);
                Some(EntityChange::Upserted {
                    key,
                    value,
                    previous: None,
                })
            }
        };
        self.publish(change.into_iter().collect());
        true
    }

    // ── Internals ────────────────────────────────────────────────────

    pub(crate) fn write(&self, record: Record<T>, force: bool) -> Applied<T> {
        let key = record.value.key();
        let Record {
            value,
            last_updated,
            source,
            ..
        } = record;
        self.write_entry(key, last_updated, source, force, move |_| value)
    }

    /// The single write path. Holds the entry lock for `key` while
    /// comparing and storing; change handlers run after it is released.
    fn write_entry<F>(
        &self,
        key: String,
        last_updated: DateTime<Utc>,
        source: Source,
        force: bool,
        build: F,
    ) -> Applied<T>
    where
        F: FnOnce(Option<&Arc<T>>) -> Arc<T>,
    {
        match self.records.entry(key) {
            Entry::Vacant(slot) => {
                if source == Source::Snapshot
                    && self
                        .deleted
                        .get(slot.key())
                        .is_some_and(|at| last_updated <= *at)
                {
                    trace!(key = %slot.key(), "snapshot predates deletion");
                    return Applied {
                        outcome: UpsertOutcome::Stale,
                        change: None,
                        revision: 0,
                        prior: None,
                    };
                }
                self.deleted.remove(slot.key());
                let value = build(None);
                let revision = self.next_revision();
                let key = slot.key().clone();
                slot.insert(Record {
                    value: Arc::clone(&value),
                    last_updated,
                    source,
                    revision,
                });
                Applied {
                    outcome: UpsertOutcome::Inserted,
                    change: Some(EntityChange::Upserted {
                        key,
                        value,
                        previous: None,
                    }),
                    revision,
                    prior: None,
                }
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if !force && (last_updated, source) <= (current.last_updated, current.source) {
                    trace!(
                        key = %slot.key(),
                        %source,
                        current_source = %current.source,
                        "dropping stale write"
                    );
                    return Applied {
                        outcome: UpsertOutcome::Stale,
                        change: None,
                        revision: current.revision,
                        prior: None,
                    };
                }

                let value = build(Some(&current.value));
                let revision = self.next_revision();
                let key = slot.key().clone();
                let prior = slot.insert(Record {
                    value: Arc::clone(&value),
                    last_updated,
                    source,
                    revision,
                });

                let change = (*prior.value != *value).then(|| EntityChange::Upserted {
                    key,
                    value,
                    previous: Some(Arc::clone(&prior.value)),
                });
                Applied {
                    outcome: if change.is_some() {
                        UpsertOutcome::Updated
                    } else {
                        UpsertOutcome::Unchanged
                    },
                    change,
                    revision,
                    prior: Some(prior),
                }
            }
        }
    }

    /// Remove `key` only if `predicate` holds for its record.
    pub(crate) fn remove_if<F>(&self, key: &str, predicate: F) -> Option<EntityChange<T>>
    where
        F: FnOnce(&Record<T>) -> bool,
    {
        let (key, removed) = self.records.remove_if(key, |_, record| predicate(record))?;
        Some(EntityChange::Removed {
            key,
            previous: removed.value,
        })
    }

    /// Rebuild the watch snapshot and run change handlers. No-op for an
    /// empty batch.
    pub(crate) fn publish(&self, changes: Vec<EntityChange<T>>) {
        if changes.is_empty() {
            return;
        }
        self.rebuild_snapshot();

        let mut handlers: Vec<(u64, Handler<T>)> = self
            .handlers
            .entries
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        if handlers.is_empty() {
            return;
        }
        handlers.sort_by_key(|(id, _)| *id);
        for change in &changes {
            for (_, handler) in &handlers {
                handler(change);
            }
        }
    }

    pub(crate) fn key_set(&self) -> HashSet<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    fn next_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::Relaxed)
    }

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(&r.value().value)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;
    use crate::model::{Device, DeviceStatus};

    fn device(id: &str, status: DeviceStatus) -> Device {
        Device {
            status,
            ..Device::bare(id)
        }
    }

    fn recorder(col: &EntityCollection<Device>) -> (Subscription, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = col.on_change(move |change| {
            let label = match change {
                EntityChange::Upserted { key, value, .. } => format!("upsert {key} {}", value.status),
                EntityChange::Removed { key, .. } => format!("remove {key}"),
            };
            sink.lock().unwrap().push(label);
        });
        (sub, seen)
    }

    #[test]
    fn resolved_value_is_order_insensitive() {
        let t = Utc::now();
        let writes = [
            Record::snapshot(device("d1", DeviceStatus::Online), t),
            Record::push(device("d1", DeviceStatus::Offline), t + Duration::seconds(2)),
            Record::new(device("d1", DeviceStatus::Warning), t + Duration::seconds(1), Source::Optimistic),
            Record::snapshot(device("d1", DeviceStatus::Warning), t + Duration::seconds(2)),
        ];

        // Highest pair: (t+2, push) → offline.
        for order in [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
            let col = EntityCollection::new();
            for i in order {
                col.upsert(writes[i].clone());
            }
            assert_eq!(col.get("d1").unwrap().status, DeviceStatus::Offline, "order {order:?}");
            assert_eq!(col.record("d1").unwrap().source, Source::Push);
        }
    }

    #[test]
    fn equal_pair_keeps_first_write() {
        let t = Utc::now();
        let col = EntityCollection::new();
        assert_eq!(
            col.upsert(Record::snapshot(device("d1", DeviceStatus::Online), t)),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            col.upsert(Record::snapshot(device("d1", DeviceStatus::Offline), t)),
            UpsertOutcome::Stale
        );
        assert_eq!(col.get("d1").unwrap().status, DeviceStatus::Online);
    }

    #[test]
    fn notifies_only_on_value_change() {
        let t = Utc::now();
        let col = EntityCollection::new();
        let (_sub, seen) = recorder(&col);

        col.upsert(Record::snapshot(device("d1", DeviceStatus::Online), t));
        let outcome = col.upsert(Record::push(
            device("d1", DeviceStatus::Online),
            t + Duration::seconds(1),
        ));
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(col.record("d1").unwrap().source, Source::Push);

        col.upsert(Record::push(
            device("d1", DeviceStatus::Offline),
            t + Duration::seconds(2),
        ));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["upsert d1 online".to_owned(), "upsert d1 offline".to_owned()]
        );
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let col = EntityCollection::new();
        let (sub, seen) = recorder(&col);

        col.upsert(Record::push(device("d1", DeviceStatus::Online), Utc::now()));
        sub.unsubscribe();
        col.upsert(Record::push(device("d2", DeviceStatus::Online), Utc::now()));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn upsert_with_merges_into_current_value() {
        let t = Utc::now();
        let col = EntityCollection::new();
        let mut named = device("d1", DeviceStatus::Online);
        named.name = Some("Greenhouse".into());
        col.upsert(Record::snapshot(named, t));

        let outcome = col.upsert_with("d1", t + Duration::seconds(1), Source::Push, |current| {
            let mut next = current.cloned().unwrap();
            next.status = DeviceStatus::Offline;
            next
        });

        assert_eq!(outcome, UpsertOutcome::Updated);
        let stored = col.get("d1").unwrap();
        assert_eq!(stored.name.as_deref(), Some("Greenhouse"));
        assert_eq!(stored.status, DeviceStatus::Offline);

        let stale = col.upsert_with("d1", t, Source::Push, |_| unreachable!());
        assert_eq!(stale, UpsertOutcome::Stale);
    }

    #[test]
    fn confirm_beats_newer_records() {
        let col = EntityCollection::new();
        col.upsert(Record::push(
            device("d1", DeviceStatus::Online),
            Utc::now() + Duration::hours(1),
        ));
        col.confirm(device("d1", DeviceStatus::Warning));

        let record = col.record("d1").unwrap();
        assert_eq!(record.value.status, DeviceStatus::Warning);
        assert_eq!(record.source, Source::Push);
    }

    #[test]
    fn restore_reverts_only_current_optimistic_write() {
        let t = Utc::now();
        let col = EntityCollection::new();
        col.upsert(Record::snapshot(device("d1", DeviceStatus::Online), t));

        let (revision, prior) = col.apply_optimistic(device("d1", DeviceStatus::Offline));
        assert!(col.restore("d1", Some(revision), prior));
        assert_eq!(col.get("d1").unwrap().status, DeviceStatus::Online);

        // A push lands on top of the optimistic value: restore is a no-op.
        let (revision, prior) = col.apply_optimistic(device("d1", DeviceStatus::Offline));
        col.upsert(Record::push(
            device("d1", DeviceStatus::Warning),
            Utc::now() + Duration::seconds(5),
        ));
        assert!(!col.restore("d1", Some(revision), prior));
        assert_eq!(col.get("d1").unwrap().status, DeviceStatus::Warning);
    }

    #[test]
    fn restore_reinstates_optimistic_removal() {
        let col = EntityCollection::new();
        col.upsert(Record::snapshot(device("d1", DeviceStatus::Online), Utc::now()));

        let prior = col.remove("d1");
        assert!(col.get("d1").is_none());
        assert!(col.restore("d1", None, prior));
        assert_eq!(col.get("d1").unwrap().status, DeviceStatus::Online);
    }

    #[test]
    fn restore_without_prior_removes_optimistic_insert() {
        let col = EntityCollection::new();
        let (revision, prior) = col.apply_optimistic(device("new", DeviceStatus::Unknown));
        assert!(prior.is_none());
        assert!(col.restore("new", Some(revision), None));
        assert!(col.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_by_key() {
        let col = EntityCollection::new();
        let t = Utc::now();
        for id in ["c", "a", "b"] {
            col.upsert(Record::snapshot(device(id, DeviceStatus::Online), t));
        }
        let ids: Vec<_> = col.snapshot().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
