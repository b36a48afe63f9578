// ── Stream event application ──
//
// Maps each stream event onto a reconciled write. The event timestamp is
// the frame `ts`, else the receipt time. Frames that announce a new record
// (`alert_raised`, `telemetry_update`, `ids_event`) may fall back to the
// record's own time instead, since that is when the event happened.

use chrono::{DateTime, Utc};
use siac_api::{EventPayload, StreamEvent};
use tracing::trace;

use super::data_store::DataStore;
use crate::model::{
    Alert, Device, DeviceStatus, Entity, EntityKind, EntityRef, IntrusionEvent, Record, Source,
    TelemetryReading,
};

/// Result of applying one stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushApplied {
    pub target: EntityRef,
    /// `true` if a resolved value changed (and subscribers were notified).
    pub changed: bool,
}

impl DataStore {
    /// Apply a decoded stream event to the store.
    pub fn apply_push(&self, event: &StreamEvent) -> PushApplied {
        let fallback = |own: Option<DateTime<Utc>>| event.ts.or(own).unwrap_or(event.received_at);
        let at = event.ts.unwrap_or(event.received_at);

        let applied = match &event.payload {
            EventPayload::Telemetry(raw) => {
                let reading = TelemetryReading::from(raw.clone());
                let at = fallback(Some(reading.timestamp));
                self.upsert_push(reading, at)
            }
            EventPayload::AlertRaised(raw) => {
                let alert = Alert::from(raw.clone());
                let at = fallback(Some(alert.timestamp));
                self.upsert_push(alert, at)
            }
            // `timestamp` / `last_seen` predate the update itself.
            EventPayload::AlertUpdated(raw) => self.upsert_push(Alert::from(raw.clone()), at),
            EventPayload::DeviceUpdated(raw) => self.upsert_push(Device::from(raw.clone()), at),
            EventPayload::DeviceStatus(change) => {
                let at = fallback(change.ts);
                let status = DeviceStatus::parse_lossy(&change.status);
                let outcome = self.devices.upsert_with(&change.device_id, at, Source::Push, |current| {
                    let mut device = current
                        .cloned()
                        .unwrap_or_else(|| Device::bare(change.device_id.clone()));
                    device.status = status;
                    device.last_seen = Some(device.last_seen.map_or(at, |seen| seen.max(at)));
                    device
                });
                PushApplied {
                    target: EntityRef::new(EntityKind::Device, change.device_id.clone()),
                    changed: outcome.changed(),
                }
            }
            EventPayload::DeviceDeleted(deleted) => PushApplied {
                target: EntityRef::new(EntityKind::Device, deleted.device_id.clone()),
                changed: self
                    .devices
                    .delete_at(&deleted.device_id, fallback(deleted.ts))
                    .is_some(),
            },
            EventPayload::Intrusion(raw) => {
                let intrusion = IntrusionEvent::from(raw.clone());
                let at = fallback(intrusion.timestamp);
                self.upsert_push(intrusion, at)
            }
        };

        self.last_push_event.send_replace(Some(event.received_at));
        trace!(
            kind = event.payload.type_name(),
            target = %applied.target,
            changed = applied.changed,
            "stream event applied"
        );
        applied
    }

    fn upsert_push<E: Entity>(&self, value: E, at: DateTime<Utc>) -> PushApplied {
        let target = value.entity_ref();
        let outcome = self.collection::<E>().upsert(Record::push(value, at));
        PushApplied {
            target,
            changed: outcome.changed(),
        }
    }
}
