// ── Wire-to-domain conversions ──
//
// Bridges `siac_api` response types into `siac_core::model` types and the
// action payloads back into request bodies. Strings with a known value set
// are parsed leniently; unknown values map to a neutral variant.

use siac_api::models::{
    AlertRecord, DashboardSummary as WireSummary, DeviceCreate, DeviceRecord, DeviceUpdate,
    IdsLogRecord, TelemetryRecord,
};

use crate::action::{DevicePatch, NewDevice};
use crate::model::{
    Alert, AlertSeverity, DashboardSummary, Device, DeviceStatus, IntrusionEvent,
    TelemetryReading,
};

// ── Devices ────────────────────────────────────────────────────────

impl From<DeviceRecord> for Device {
    fn from(raw: DeviceRecord) -> Self {
        Self {
            id: raw.device_id,
            name: raw.name,
            device_type: raw.device_type,
            firmware_version: raw.fw_version,
            location: raw.location,
            tags: raw.tags.unwrap_or_default(),
            status: raw
                .status
                .as_deref()
                .map_or(DeviceStatus::Unknown, DeviceStatus::parse_lossy),
            last_seen: raw.last_seen,
        }
    }
}

impl From<&NewDevice> for DeviceCreate {
    fn from(new: &NewDevice) -> Self {
        Self {
            device_id: new.device_id.clone(),
            name: new.name.clone(),
            device_type: new.device_type.clone(),
            fw_version: new.firmware_version.clone(),
            location: new.location.clone(),
            tags: new.tags.clone(),
        }
    }
}

impl From<&DevicePatch> for DeviceUpdate {
    fn from(patch: &DevicePatch) -> Self {
        Self {
            name: patch.name.clone(),
            device_type: patch.device_type.clone(),
            fw_version: patch.firmware_version.clone(),
            location: patch.location.clone(),
            tags: patch.tags.clone(),
        }
    }
}

// ── Alerts ─────────────────────────────────────────────────────────

impl From<AlertRecord> for Alert {
    fn from(raw: AlertRecord) -> Self {
        Self {
            id: raw.alert_id,
            device_id: raw.device_id,
            timestamp: raw.ts,
            severity: AlertSeverity::parse_lossy(&raw.severity),
            score: raw.score,
            reason: raw.reason,
            acknowledged: raw.acknowledged,
            resolved: raw.resolved,
            metadata: raw.metadata.unwrap_or_default(),
        }
    }
}

// ── Telemetry ──────────────────────────────────────────────────────

/// Flat fields take precedence; the nested `sensors`/`net` blocks fill gaps.
impl From<TelemetryRecord> for TelemetryReading {
    fn from(raw: TelemetryRecord) -> Self {
        let sensors = raw.sensors.unwrap_or_default();
        let net = raw.net.unwrap_or_default();
        Self {
            device_id: raw.device_id,
            timestamp: raw.ts,
            temperature: raw.temperature.or(sensors.temperature),
            humidity: raw.humidity.or(sensors.humidity),
            distance: raw.distance.or(sensors.distance),
            motion: raw.motion.or(sensors.motion),
            tx_bytes: raw.tx_bytes.unwrap_or(net.tx_bytes),
            rx_bytes: raw.rx_bytes.unwrap_or(net.rx_bytes),
            connections: raw.connections.unwrap_or(net.connections),
        }
    }
}

// ── Intrusion detection ────────────────────────────────────────────

impl From<IdsLogRecord> for IntrusionEvent {
    fn from(raw: IdsLogRecord) -> Self {
        Self {
            timestamp: raw.event_ts,
            event_type: raw.event_type,
            src_ip: raw.src_ip,
            src_port: raw.src_port,
            dest_ip: raw.dest_ip,
            dest_port: raw.dest_port,
            protocol: raw.proto,
            signature: raw.signature,
            signature_id: raw.signature_id,
            severity: raw.severity.as_deref().and_then(|s| s.trim().parse().ok()),
        }
    }
}

// ── Summary ────────────────────────────────────────────────────────

impl From<WireSummary> for DashboardSummary {
    fn from(raw: WireSummary) -> Self {
        Self {
            total_devices: raw.total_devices,
            alerts_24h: raw.alerts_24h,
            active_alerts: raw.alerts_active,
            anomalies_24h: raw.anomalies_24h,
            telemetry_24h: raw.telemetry_24h,
            data_volume_today_gb: raw.data_volume_today_gb,
            system_status: raw.system_status,
        }
    }
}
