// ── Optimistic action dispatcher ──
//
// Idle → Optimistic → {Confirmed | RolledBack}. The optimistic write is
// undone by a guard, so a dispatch future dropped mid-flight rolls back
// exactly like a failed request.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Action, ActionKind, ActionOutcome, ActionState, Confirmed, PendingAction};
use crate::backend::{ActionResponse, Backend};
use crate::error::CoreError;
use crate::model::{Alert, Device, Entity, EntityRef};
use crate::store::DataStore;

/// Runs [`Action`]s against a [`Backend`] with optimistic store updates.
pub struct ActionDispatcher<B: Backend> {
    backend: Arc<B>,
    store: Arc<DataStore>,
    pending: DashMap<EntityRef, PendingAction>,
}

/// What the store showed while the request was in flight.
enum Shown {
    Device(Device),
    Alert(Alert),
    Removed { device_id: String },
}

/// Undoes an optimistic write on drop unless disarmed.
struct Rollback<'a> {
    undo: Option<Box<dyn FnOnce() + Send + 'a>>,
}

impl Rollback<'_> {
    fn disarm(mut self) {
        self.undo = None;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

/// Frees the target for new actions once the dispatch ends, however it ends.
struct Reservation<'a> {
    pending: &'a DashMap<EntityRef, PendingAction>,
    target: EntityRef,
}

impl Reservation<'_> {
    fn advance(&self, state: ActionState) {
        if let Some(mut pending) = self.pending.get_mut(&self.target) {
            pending.state = state;
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.target);
    }
}

impl<B: Backend> ActionDispatcher<B> {
    pub fn new(backend: Arc<B>, store: Arc<DataStore>) -> Self {
        Self {
            backend,
            store,
            pending: DashMap::new(),
        }
    }

    /// Actions currently in flight.
    pub fn pending(&self) -> Vec<PendingAction> {
        self.pending.iter().map(|p| p.value().clone()).collect()
    }

    pub fn is_pending(&self, target: &EntityRef) -> bool {
        self.pending.contains_key(target)
    }

    /// Apply `action` optimistically, send it, then confirm or roll back.
    ///
    /// Fails fast with [`CoreError::ActionPending`] while another action on
    /// the same target is in flight, and with [`CoreError::NotFound`] when
    /// an update targets a key the store does not hold.
    pub async fn dispatch(&self, action: Action) -> Result<ActionOutcome, CoreError> {
        let target = action.target();
        let kind = action.kind();
        let id = Uuid::new_v4();

        let reservation = self.reserve(id, &target, kind)?;
        let (shown, rollback) = self.apply_optimistic(&action, &target)?;
        reservation.advance(ActionState::Optimistic);
        debug!(%id, %target, %kind, "action applied optimistically");

        match self.backend.execute(&action).await {
            Ok(response) => {
                rollback.disarm();
                let confirmed = self.settle(shown, response);
                reservation.advance(ActionState::Confirmed);
                info!(%id, %target, %kind, "action confirmed");
                Ok(ActionOutcome {
                    id,
                    target,
                    kind,
                    state: ActionState::Confirmed,
                    confirmed,
                })
            }
            Err(e) => {
                drop(rollback);
                reservation.advance(ActionState::RolledBack);
                warn!(%id, %target, %kind, error = %e, "action failed, rolled back");
                Err(CoreError::ActionFailed {
                    target,
                    message: e.to_string(),
                })
            }
        }
    }

    fn reserve(
        &self,
        id: Uuid,
        target: &EntityRef,
        kind: ActionKind,
    ) -> Result<Reservation<'_>, CoreError> {
        match self.pending.entry(target.clone()) {
            Entry::Occupied(_) => Err(CoreError::ActionPending {
                target: target.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(PendingAction {
                    id,
                    target: target.clone(),
                    kind,
                    submitted_at: Utc::now(),
                    state: ActionState::Idle,
                });
                Ok(Reservation {
                    pending: &self.pending,
                    target: target.clone(),
                })
            }
        }
    }

    fn apply_optimistic(
        &self,
        action: &Action,
        target: &EntityRef,
    ) -> Result<(Shown, Rollback<'_>), CoreError> {
        match action {
            Action::CreateDevice(new) => {
                let device = new.to_device();
                Ok((Shown::Device(device.clone()), self.show(device)))
            }
            Action::UpdateDevice { device_id, patch } => {
                let current = self.existing::<Device>(device_id, target)?;
                let device = patch.apply_to(&current);
                Ok((Shown::Device(device.clone()), self.show(device)))
            }
            Action::DeleteDevice { device_id } => {
                let devices = self.store.devices();
                let prior = devices.remove(device_id);
                let key = device_id.clone();
                let rollback = Rollback {
                    undo: Some(Box::new(move || {
                        devices.restore(&key, None, prior);
                    })),
                };
                Ok((
                    Shown::Removed {
                        device_id: device_id.clone(),
                    },
                    rollback,
                ))
            }
            Action::AcknowledgeAlert { alert_id } => {
                let mut alert = (*self.existing::<Alert>(alert_id, target)?).clone();
                alert.acknowledged = true;
                Ok((Shown::Alert(alert.clone()), self.show(alert)))
            }
            Action::ResolveAlert { alert_id } => {
                let mut alert = (*self.existing::<Alert>(alert_id, target)?).clone();
                alert.resolved = true;
                Ok((Shown::Alert(alert.clone()), self.show(alert)))
            }
        }
    }

    fn existing<E: Entity>(&self, key: &str, target: &EntityRef) -> Result<Arc<E>, CoreError> {
        self.store
            .collection::<E>()
            .get(key)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: target.kind.to_string(),
                identifier: key.to_owned(),
            })
    }

    /// Write `value` optimistically; the returned guard reverts it.
    fn show<E: Entity>(&self, value: E) -> Rollback<'_> {
        let collection = self.store.collection::<E>();
        let key = value.key();
        let (revision, prior) = collection.apply_optimistic(value);
        Rollback {
            undo: Some(Box::new(move || {
                collection.restore(&key, Some(revision), prior);
            })),
        }
    }

    /// Write the backend's answer with always-winning priority. An empty
    /// success promotes the optimistic value.
    fn settle(&self, shown: Shown, response: ActionResponse) -> Confirmed {
        match shown {
            Shown::Removed { device_id } => {
                self.store.devices().delete_at(&device_id, Utc::now());
                Confirmed::Deleted { device_id }
            }
            Shown::Device(optimistic) => {
                let device = match response {
                    ActionResponse::Device(device) => device,
                    _ => optimistic.clone(),
                };
                if device.id != optimistic.id {
                    self.store.devices().remove(&optimistic.id);
                }
                self.store.devices().confirm(device.clone());
                Confirmed::Device(device)
            }
            Shown::Alert(optimistic) => {
                let alert = match response {
                    ActionResponse::Alert(alert) => alert,
                    _ => optimistic,
                };
                self.store.alerts().confirm(alert.clone());
                Confirmed::Alert(alert)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::action::{DevicePatch, NewDevice};
    use crate::model::{DeviceStatus, EntityKind, Record, Source};
    use crate::testing::FakeBackend;

    fn setup(backend: FakeBackend) -> (Arc<FakeBackend>, Arc<DataStore>, ActionDispatcher<FakeBackend>) {
        let backend = Arc::new(backend);
        let store = Arc::new(DataStore::new());
        let dispatcher = ActionDispatcher::new(Arc::clone(&backend), Arc::clone(&store));
        (backend, store, dispatcher)
    }

    fn seed_device(store: &DataStore, id: &str, name: &str) {
        let mut device = Device::bare(id);
        device.name = Some(name.into());
        device.status = DeviceStatus::Online;
        store.devices().upsert(Record::snapshot(device, Utc::now()));
    }

    fn rename(id: &str, name: &str) -> Action {
        Action::UpdateDevice {
            device_id: id.into(),
            patch: DevicePatch {
                name: Some(name.into()),
                ..DevicePatch::default()
            },
        }
    }

    #[tokio::test]
    async fn failed_update_rolls_back() {
        let (backend, store, dispatcher) = setup(FakeBackend::new());
        seed_device(&store, "d2", "Original");
        backend.fail_next_action("backend exploded");

        let err = dispatcher.dispatch(rename("d2", "X")).await.unwrap_err();

        assert!(
            matches!(&err, CoreError::ActionFailed { target, .. } if target.key == "d2"),
            "got: {err:?}"
        );
        let record = store.devices().record("d2").unwrap();
        assert_eq!(record.value.name.as_deref(), Some("Original"));
        assert_eq!(record.source, Source::Snapshot);
        assert!(dispatcher.pending().is_empty());
    }

    #[tokio::test]
    async fn empty_success_promotes_optimistic_value() {
        let (backend, store, dispatcher) = setup(FakeBackend::new());
        seed_device(&store, "d2", "Original");
        backend.respond_next(ActionResponse::Empty);

        let outcome = dispatcher.dispatch(rename("d2", "X")).await.unwrap();

        assert_eq!(outcome.state, ActionState::Confirmed);
        let record = store.devices().record("d2").unwrap();
        assert_eq!(record.value.name.as_deref(), Some("X"));
        assert_eq!(record.source, Source::Push);
        assert_eq!(backend.executed(), vec![rename("d2", "X")]);
    }

    #[tokio::test]
    async fn server_value_wins_over_optimistic() {
        let (backend, store, dispatcher) = setup(FakeBackend::new());
        let mut server = Device::bare("esp32-05");
        server.status = DeviceStatus::Offline;
        backend.respond_next(ActionResponse::Device(server.clone()));

        let outcome = dispatcher
            .dispatch(Action::CreateDevice(NewDevice::new("esp32-05")))
            .await
            .unwrap();

        assert_eq!(outcome.confirmed, Confirmed::Device(server));
        assert_eq!(
            store.devices().get("esp32-05").unwrap().status,
            DeviceStatus::Offline
        );
    }

    #[tokio::test]
    async fn update_of_unknown_key_is_not_found() {
        let (backend, _store, dispatcher) = setup(FakeBackend::new());

        let err = dispatcher.dispatch(rename("ghost", "X")).await.unwrap_err();

        assert!(matches!(err, CoreError::NotFound { .. }), "got: {err:?}");
        assert!(backend.executed().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_restores_device() {
        let (backend, store, dispatcher) = setup(FakeBackend::new());
        seed_device(&store, "d1", "Door");
        backend.fail_next_action("forbidden");

        let result = dispatcher
            .dispatch(Action::DeleteDevice {
                device_id: "d1".into(),
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("Door"));
    }

    #[tokio::test]
    async fn confirmed_delete_removes_key() {
        let (_backend, store, dispatcher) = setup(FakeBackend::new());
        seed_device(&store, "d1", "Door");

        let outcome = dispatcher
            .dispatch(Action::DeleteDevice {
                device_id: "d1".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            outcome.confirmed,
            Confirmed::Deleted {
                device_id: "d1".into()
            }
        );
        assert!(store.devices().is_empty());
    }

    #[tokio::test]
    async fn snapshot_started_before_delete_does_not_restore_device() {
        let (_backend, store, dispatcher) = setup(FakeBackend::new());
        seed_device(&store, "d1", "Door");
        let fetch_started = Utc::now();

        dispatcher
            .dispatch(Action::DeleteDevice {
                device_id: "d1".into(),
            })
            .await
            .unwrap();
        store
            .devices()
            .replace_snapshot(vec![Device::bare("d1")], fetch_started);

        assert!(store.devices().is_empty());
    }

    #[tokio::test]
    async fn second_action_on_same_key_waits_for_first() {
        let (backend, store, dispatcher) = setup(FakeBackend::gated());
        seed_device(&store, "d1", "Door");
        let dispatcher = Arc::new(dispatcher);

        let first = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.dispatch(rename("d1", "A")).await }
        });
        while !dispatcher.is_pending(&EntityRef::new(EntityKind::Device, "d1")) {
            tokio::task::yield_now().await;
        }
        assert_eq!(dispatcher.pending()[0].state, ActionState::Optimistic);
        assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("A"));

        let rejected = dispatcher.dispatch(rename("d1", "B")).await.unwrap_err();
        assert!(matches!(rejected, CoreError::ActionPending { .. }), "got: {rejected:?}");

        backend.release(1);
        first.await.unwrap().unwrap();

        backend.release(1);
        dispatcher.dispatch(rename("d1", "B")).await.unwrap();
        assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn dropped_dispatch_rolls_back() {
        let (_backend, store, dispatcher) = setup(FakeBackend::gated());
        seed_device(&store, "d1", "Door");

        {
            let mut fut = tokio_test::task::spawn(dispatcher.dispatch(rename("d1", "Gate")));
            assert!(fut.poll().is_pending());
            assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("Gate"));
        }

        assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("Door"));
        assert!(dispatcher.pending().is_empty());
    }

    #[tokio::test]
    async fn push_during_flight_survives_rollback() {
        let (backend, store, dispatcher) = setup(FakeBackend::gated());
        seed_device(&store, "d1", "Door");
        let dispatcher = Arc::new(dispatcher);

        let flight = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.dispatch(rename("d1", "Gate")).await }
        });
        while !dispatcher.is_pending(&EntityRef::new(EntityKind::Device, "d1")) {
            tokio::task::yield_now().await;
        }

        let mut pushed = Device::bare("d1");
        pushed.name = Some("Pushed".into());
        store
            .devices()
            .upsert(Record::push(pushed, Utc::now() + chrono::Duration::seconds(1)));

        backend.fail_next_action("timeout");
        backend.release(1);
        assert!(flight.await.unwrap().is_err());

        assert_eq!(store.devices().get("d1").unwrap().name.as_deref(), Some("Pushed"));
    }
}
