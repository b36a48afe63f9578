use serde::Serialize;

/// Fleet-wide counters shown on the dashboard landing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_devices: u64,
    pub alerts_24h: u64,
    pub active_alerts: u64,
    pub anomalies_24h: u64,
    pub telemetry_24h: u64,
    pub data_volume_today_gb: f64,
    pub system_status: Option<String>,
}
