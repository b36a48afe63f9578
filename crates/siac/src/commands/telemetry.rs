//! Telemetry and intrusion-event listings.

use std::sync::Arc;

use siac_core::{Entity, IntrusionEvent, ResourceKind, TelemetryReading};
use tabled::Tabled;

use crate::cli::{GlobalOpts, TelemetryArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

fn reading(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.1}{unit}"))
}

#[derive(Tabled)]
struct TelemetryRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Motion")]
    motion: String,
    #[tabled(rename = "TX/RX bytes")]
    traffic: String,
}

impl From<&Arc<TelemetryReading>> for TelemetryRow {
    fn from(t: &Arc<TelemetryReading>) -> Self {
        Self {
            device: t.device_id.clone(),
            at: t.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            temperature: reading(t.temperature, "°C"),
            humidity: reading(t.humidity, "%"),
            distance: reading(t.distance, "cm"),
            motion: t
                .motion
                .map_or_else(|| "-".into(), |m| if m { "yes" } else { "no" }.to_owned()),
            traffic: format!("{}/{}", t.tx_bytes, t.rx_bytes),
        }
    }
}

#[derive(Tabled)]
struct IntrusionRow {
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Proto")]
    protocol: String,
    #[tabled(rename = "Signature")]
    signature: String,
}

fn endpoint(ip: Option<&str>, port: Option<&str>) -> String {
    match (ip, port) {
        (Some(ip), Some(port)) => format!("{ip}:{port}"),
        (Some(ip), None) => ip.to_owned(),
        _ => "-".into(),
    }
}

impl From<&Arc<IntrusionEvent>> for IntrusionRow {
    fn from(e: &Arc<IntrusionEvent>) -> Self {
        Self {
            at: e
                .timestamp
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            severity: e.severity_label().into(),
            source: endpoint(e.src_ip.as_deref(), e.src_port.as_deref()),
            destination: endpoint(e.dest_ip.as_deref(), e.dest_port.as_deref()),
            protocol: or_dash(e.protocol.as_deref()),
            signature: or_dash(e.signature.as_deref()),
        }
    }
}

pub async fn handle_telemetry(
    args: TelemetryArgs,
    ctx: &Context,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let all = util::oneshot(ctx, &[ResourceKind::Telemetry], |c| async move {
        Ok(c.store().telemetry_snapshot())
    })
    .await?;
    let readings: Vec<Arc<TelemetryReading>> = all
        .iter()
        .filter(|t| args.device.as_ref().is_none_or(|d| *d == t.device_id))
        .cloned()
        .collect();

    let out = output::render_list(&global.output, &readings, |t| TelemetryRow::from(t), |t| {
        t.device_id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle_intrusions(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let all = util::oneshot(ctx, &[ResourceKind::Intrusions], |c| async move {
        Ok(c.store().intrusions_snapshot())
    })
    .await?;
    let mut events: Vec<Arc<IntrusionEvent>> = all.iter().cloned().collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let out = output::render_list(&global.output, &events, |e| IntrusionRow::from(e), |e| e.key())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_formats_partial_addresses() {
        assert_eq!(endpoint(Some("10.0.0.5"), Some("443")), "10.0.0.5:443");
        assert_eq!(endpoint(Some("10.0.0.5"), None), "10.0.0.5");
        assert_eq!(endpoint(None, Some("443")), "-");
    }

    #[test]
    fn missing_readings_show_a_dash() {
        assert_eq!(reading(None, "%"), "-");
        assert_eq!(reading(Some(21.04), "°C"), "21.0°C");
    }
}
