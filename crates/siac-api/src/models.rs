// Wire types for the SIAC-IoT backend (`/api/v1`).
//
// Field names follow the backend's JSON exactly. Optional fields default so
// that partially-populated rows from the time-series store still decode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".into()
}

/// Non-2xx response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// `POST /devices` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceCreate {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `PUT /devices/{id}` body. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// `device_status` event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceStatusChange {
    pub device_id: String,
    pub status: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

/// `device_deleted` event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceDeleted {
    pub device_id: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: String,
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub severity: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

// ── Telemetry ────────────────────────────────────────────────────────

/// Nested sensor block some device firmwares still emit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorBlock {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub motion: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetBlock {
    #[serde(default)]
    pub tx_bytes: u64,
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub motion: Option<bool>,
    #[serde(default)]
    pub tx_bytes: Option<u64>,
    #[serde(default)]
    pub rx_bytes: Option<u64>,
    #[serde(default)]
    pub connections: Option<u32>,
    #[serde(default)]
    pub sensors: Option<SensorBlock>,
    #[serde(default)]
    pub net: Option<NetBlock>,
}

// ── Intrusion detection ──────────────────────────────────────────────

/// One Suricata log row. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdsLogRecord {
    #[serde(default)]
    pub event_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub src_port: Option<String>,
    #[serde(default)]
    pub dest_ip: Option<String>,
    #[serde(default)]
    pub dest_port: Option<String>,
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub signature_id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

// ── Dashboard ────────────────────────────────────────────────────────

/// `GET /dashboard_summary`. The backend returns `{}` when its store is
/// down, so every field defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub total_devices: u64,
    #[serde(default)]
    pub alerts_24h: u64,
    #[serde(default)]
    pub alerts_active: u64,
    #[serde(default)]
    pub anomalies_24h: u64,
    #[serde(default)]
    pub telemetry_24h: u64,
    #[serde(default)]
    pub data_volume_today_gb: f64,
    #[serde(default)]
    pub system_status: Option<String>,
}
