// ── Typed payloads for device actions ──

use serde::{Deserialize, Serialize};

use crate::model::{Device, DeviceStatus};

/// Registration payload for a new device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl NewDevice {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    /// The device as shown before the backend confirms it.
    pub fn to_device(&self) -> Device {
        Device {
            id: self.device_id.clone(),
            name: self.name.clone(),
            device_type: self.device_type.clone(),
            firmware_version: self.firmware_version.clone(),
            location: self.location.clone(),
            tags: self.tags.clone(),
            status: DeviceStatus::Unknown,
            last_seen: None,
        }
    }
}

/// Partial device update. Only set fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, device: &Device) -> Device {
        let mut next = device.clone();
        if let Some(name) = &self.name {
            next.name = Some(name.clone());
        }
        if let Some(device_type) = &self.device_type {
            next.device_type = Some(device_type.clone());
        }
        if let Some(fw) = &self.firmware_version {
            next.firmware_version = Some(fw.clone());
        }
        if let Some(location) = &self.location {
            next.location = Some(location.clone());
        }
        if let Some(tags) = &self.tags {
            next.tags.clone_from(tags);
        }
        next
    }
}
