// ── Device domain type ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use super::kind::{Entity, EntityKind};
use crate::store::{DataStore, EntityCollection};

/// Reported device health. Anything the backend sends that isn't one of
/// the known values maps to [`Unknown`](Self::Unknown).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// An IoT device in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub firmware_version: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// A device known only by id, e.g. first seen in a status push.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            device_type: None,
            firmware_version: None,
            location: None,
            tags: Vec::new(),
            status: DeviceStatus::Unknown,
            last_seen: None,
        }
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl Entity for Device {
    const KIND: EntityKind = EntityKind::Device;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn collection(store: &DataStore) -> &EntityCollection<Self> {
        &store.devices
    }
}
