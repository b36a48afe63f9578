use chrono::{DateTime, Utc};
use serde::Serialize;

use super::kind::{Entity, EntityKind};
use crate::store::{DataStore, EntityCollection};

/// Latest sensor/network reading for one device. Keyed by device id, so
/// the collection holds one reading per device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub distance: Option<f64>,
    pub motion: Option<bool>,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub connections: u32,
}

impl Entity for TelemetryReading {
    const KIND: EntityKind = EntityKind::Telemetry;

    fn key(&self) -> String {
        self.device_id.clone()
    }

    fn collection(store: &DataStore) -> &EntityCollection<Self> {
        &store.telemetry
    }
}
