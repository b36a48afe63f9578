// ── Anomaly alert domain type ──

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::kind::{Entity, EntityKind};
use crate::store::{DataStore, EntityCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Map the backend's free-form severity. `info` reads as low,
    /// `warning` as medium; anything unrecognized is medium.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// An anomaly-detection alert raised against a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub score: f64,
    pub reason: Option<String>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

impl Entity for Alert {
    const KIND: EntityKind = EntityKind::Alert;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn collection(store: &DataStore) -> &EntityCollection<Self> {
        &store.alerts
    }
}
