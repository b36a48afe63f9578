use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::store::{DataStore, EntityCollection};

/// Keyed entity collections held by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[strum(to_string = "devices", serialize = "device")]
    Device,
    #[strum(to_string = "alerts", serialize = "alert")]
    Alert,
    #[strum(serialize = "telemetry")]
    Telemetry,
    #[strum(to_string = "intrusions", serialize = "intrusion")]
    Intrusion,
}

impl EntityKind {
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        Self::from_str(name)
            .map_err(|_| CoreError::config(format!("unknown entity kind `{name}`")))
    }
}

/// Everything the fetcher can pull: the entity kinds plus the dashboard
/// summary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Devices,
    Alerts,
    Telemetry,
    Intrusions,
    Summary,
}

impl ResourceKind {
    pub const ALL: [Self; 5] = [
        Self::Devices,
        Self::Alerts,
        Self::Telemetry,
        Self::Intrusions,
        Self::Summary,
    ];

    /// Unknown names are configuration errors.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        Self::from_str(name)
            .map_err(|_| CoreError::config(format!("unknown resource `{name}`")))
    }

    /// Refresh cadence the dashboard pages use.
    pub fn default_poll_interval(self) -> Duration {
        match self {
            Self::Alerts | Self::Telemetry => Duration::from_secs(10),
            Self::Devices => Duration::from_secs(15),
            Self::Intrusions | Self::Summary => Duration::from_secs(30),
        }
    }

    /// The collection this resource feeds, `None` for the summary.
    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Self::Devices => Some(EntityKind::Device),
            Self::Alerts => Some(EntityKind::Alert),
            Self::Telemetry => Some(EntityKind::Telemetry),
            Self::Intrusions => Some(EntityKind::Intrusion),
            Self::Summary => None,
        }
    }
}

impl From<EntityKind> for ResourceKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Device => Self::Devices,
            EntityKind::Alert => Self::Alerts,
            EntityKind::Telemetry => Self::Telemetry,
            EntityKind::Intrusion => Self::Intrusions,
        }
    }
}

/// A specific entity: kind plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EntityKind::Device => "device",
            EntityKind::Alert => "alert",
            EntityKind::Telemetry => "telemetry",
            EntityKind::Intrusion => "intrusion",
        };
        write!(f, "{kind} {}", self.key)
    }
}

/// A record type the store keeps in a keyed collection.
///
/// Equality is value equality; the store uses it to suppress change
/// notifications when a write doesn't change anything.
pub trait Entity: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn key(&self) -> String;

    fn collection(store: &DataStore) -> &EntityCollection<Self>;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.key())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_plural_and_singular_names() {
        assert_eq!(EntityKind::parse("devices").unwrap(), EntityKind::Device);
        assert_eq!(EntityKind::parse("Alert").unwrap(), EntityKind::Alert);
        assert_eq!(ResourceKind::parse("SUMMARY").unwrap(), ResourceKind::Summary);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        assert!(matches!(
            EntityKind::parse("routers"),
            Err(CoreError::Config { .. })
        ));
        assert!(matches!(
            ResourceKind::parse(""),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn display_uses_config_names() {
        assert_eq!(ResourceKind::Intrusions.to_string(), "intrusions");
        assert_eq!(
            EntityRef::new(EntityKind::Device, "esp32-01").to_string(),
            "device esp32-01"
        );
    }
}
