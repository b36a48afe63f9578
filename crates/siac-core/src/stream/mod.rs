// ── Reactive entity streams ──
//
// Two ways to follow a collection: `EntityStream` tracks whole snapshots
// through a `watch` channel (late subscribers see the latest list), while
// `ChangeFeed` queues every per-key change that survived reconciliation.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;

pub use filter::{AlertFilter, DeviceFilter};

use crate::model::Entity;
use crate::store::{EntityChange, EntityCollection, Subscription};

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Snapshot subscription to one collection, ordered by key.
pub struct EntityStream<T: Entity> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Entity> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Look up `key` in the current snapshot.
    pub fn find(&self, key: &str) -> Option<Arc<T>> {
        self.current
            .binary_search_by(|v| v.key().as_str().cmp(key))
            .ok()
            .map(|i| Arc::clone(&self.current[i]))
    }

    /// Wait for the next rebuild. `None` once the collection is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Yields the current snapshot first, then one per rebuild.
    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter over [`EntityStream`].
pub struct EntityWatchStream<T: Entity> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Entity> Stream for EntityWatchStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Queue of [`EntityChange`]s for one collection, starting at creation.
///
/// Unlike a snapshot stream nothing is coalesced: a consumer that falls
/// behind still sees every change in order. Dropping the feed unsubscribes.
pub struct ChangeFeed<T: Entity> {
    receiver: mpsc::UnboundedReceiver<EntityChange<T>>,
    _subscription: Subscription,
}

impl<T: Entity> ChangeFeed<T> {
    pub(crate) fn new(collection: &EntityCollection<T>) -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();
        let subscription = collection.on_change(move |change| {
            // The feed was dropped; its subscription goes with it.
            let _ = tx.send(change.clone());
        });
        Self {
            receiver,
            _subscription: subscription,
        }
    }

    /// Next change. `None` once the collection is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<EntityChange<T>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EntityChange<T>> {
        self.receiver.try_recv().ok()
    }
}

impl<T: Entity> Stream for ChangeFeed<T> {
    type Item = EntityChange<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::{Device, DeviceStatus, Record};

    fn device(id: &str, status: DeviceStatus) -> Device {
        Device {
            status,
            ..Device::bare(id)
        }
    }

    #[tokio::test]
    async fn feed_reports_each_change_in_order() {
        let devices = EntityCollection::<Device>::new();
        let mut feed = devices.changes();
        let t = Utc::now();

        devices.upsert(Record::snapshot(device("d1", DeviceStatus::Online), t));
        devices.upsert(Record::push(
            device("d1", DeviceStatus::Offline),
            t + Duration::seconds(1),
        ));
        devices.remove("d1");

        let added = feed.recv().await.unwrap();
        assert!(matches!(&added, EntityChange::Upserted { previous: None, .. }));
        let updated = feed.recv().await.unwrap();
        assert_eq!(updated.current().unwrap().status, DeviceStatus::Offline);
        assert!(matches!(feed.recv().await.unwrap(), EntityChange::Removed { .. }));
        assert!(feed.try_recv().is_none());
    }

    #[tokio::test]
    async fn feed_skips_losing_and_identical_writes() {
        let devices = EntityCollection::<Device>::new();
        let t = Utc::now();
        devices.upsert(Record::push(device("d1", DeviceStatus::Online), t));
        let mut feed = devices.changes();

        devices.upsert(Record::snapshot(
            device("d1", DeviceStatus::Offline),
            t - Duration::seconds(5),
        ));
        devices.upsert(Record::push(
            device("d1", DeviceStatus::Online),
            t + Duration::seconds(1),
        ));

        assert!(tokio_test::task::spawn(feed.recv()).poll().is_pending());
    }

    #[tokio::test]
    async fn feed_ends_with_its_collection() {
        let devices = EntityCollection::<Device>::new();
        let mut feed = devices.changes();
        devices.upsert(Record::snapshot(device("d1", DeviceStatus::Online), Utc::now()));
        drop(devices);

        assert!(feed.recv().await.is_some());
        assert!(feed.recv().await.is_none());
    }

    #[test]
    fn find_uses_the_held_snapshot() {
        let devices = EntityCollection::<Device>::new();
        let t = Utc::now();
        devices.replace_snapshot(
            vec![
                device("d2", DeviceStatus::Online),
                device("d1", DeviceStatus::Warning),
            ],
            t,
        );
        let stream = devices.subscribe();
        devices.remove("d1");

        assert_eq!(stream.find("d1").unwrap().status, DeviceStatus::Warning);
        assert!(stream.find("d3").is_none());
        assert_eq!(stream.latest().len(), 1);
    }
}
