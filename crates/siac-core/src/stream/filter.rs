// ── Filter predicates for entity snapshots ──
//
// Used by the CLI to narrow listings without re-querying the backend.

use crate::model::{Alert, AlertSeverity, Device, DeviceStatus};

/// Filter predicate for device collections.
pub enum DeviceFilter {
    All,
    ByStatus(DeviceStatus),
    ByLocation(String),
    Tagged(String),
    Online,
    Custom(Box<dyn Fn(&Device) -> bool + Send + Sync>),
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::ByStatus(status) => device.status == *status,
            Self::ByLocation(location) => device
                .location
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(location)),
            Self::Tagged(tag) => device.tags.iter().any(|t| t == tag),
            Self::Online => device.status.is_online(),
            Self::Custom(f) => f(device),
        }
    }
}

/// Filter predicate for alert collections.
pub enum AlertFilter {
    All,
    Active,
    Unacknowledged,
    /// At or above the given severity.
    MinSeverity(AlertSeverity),
    ByDevice(String),
    Custom(Box<dyn Fn(&Alert) -> bool + Send + Sync>),
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        match self {
            Self::All => true,
            Self::Active => alert.is_active(),
            Self::Unacknowledged => alert.is_active() && !alert.acknowledged,
            Self::MinSeverity(min) => alert.severity >= *min,
            Self::ByDevice(id) => alert.device_id == *id,
            Self::Custom(f) => f(alert),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;

    fn alert(severity: AlertSeverity, acknowledged: bool, resolved: bool) -> Alert {
        Alert {
            id: "a-1".into(),
            device_id: "esp32-01".into(),
            timestamp: Utc::now(),
            severity,
            score: 0.5,
            reason: None,
            acknowledged,
            resolved,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn alert_filters() {
        let open = alert(AlertSeverity::High, false, false);
        let acked = alert(AlertSeverity::Low, true, false);
        let closed = alert(AlertSeverity::Critical, true, true);

        assert!(AlertFilter::Unacknowledged.matches(&open));
        assert!(!AlertFilter::Unacknowledged.matches(&acked));
        assert!(!AlertFilter::Active.matches(&closed));
        assert!(AlertFilter::MinSeverity(AlertSeverity::High).matches(&closed));
        assert!(!AlertFilter::MinSeverity(AlertSeverity::Medium).matches(&acked));
        assert!(AlertFilter::ByDevice("esp32-01".into()).matches(&open));
    }

    #[test]
    fn device_filters() {
        let mut device = Device::bare("esp32-01");
        device.location = Some("Lab A".into());
        device.tags = vec!["greenhouse".into()];
        device.status = DeviceStatus::Online;

        assert!(DeviceFilter::Online.matches(&device));
        assert!(DeviceFilter::ByLocation("lab a".into()).matches(&device));
        assert!(DeviceFilter::Tagged("greenhouse".into()).matches(&device));
        assert!(!DeviceFilter::ByStatus(DeviceStatus::Offline).matches(&device));
        assert!(DeviceFilter::Custom(Box::new(|d| d.id.starts_with("esp32"))).matches(&device));
    }
}
