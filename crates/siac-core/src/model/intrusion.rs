use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::kind::{Entity, EntityKind};
use crate::store::{DataStore, EntityCollection};

/// One Suricata IDS event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntrusionEvent {
    pub timestamp: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub src_ip: Option<String>,
    pub src_port: Option<String>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<String>,
    pub protocol: Option<String>,
    pub signature: Option<String>,
    pub signature_id: Option<String>,
    /// Suricata priority: 1 = critical … 4 = low.
    pub severity: Option<u8>,
}

impl IntrusionEvent {
    pub fn severity_label(&self) -> &'static str {
        match self.severity {
            Some(1) => "critical",
            Some(2) => "high",
            Some(3) => "medium",
            Some(4) => "low",
            _ => "unknown",
        }
    }
}

impl Entity for IntrusionEvent {
    const KIND: EntityKind = EntityKind::Intrusion;

    /// IDS rows carry no id; `"{event_ts}:{signature_id}:{src_ip}"`.
    fn key(&self) -> String {
        let ts = self
            .timestamp
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_default();
        format!(
            "{ts}:{}:{}",
            self.signature_id.as_deref().unwrap_or_default(),
            self.src_ip.as_deref().unwrap_or_default()
        )
    }

    fn collection(store: &DataStore) -> &EntityCollection<Self> {
        &store.intrusions
    }
}
