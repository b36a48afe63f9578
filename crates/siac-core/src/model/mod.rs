// ── Domain model ──
//
// Canonical types the store holds. Wire types from siac-api are converted
// into these in `convert`.

mod alert;
mod common;
mod device;
mod intrusion;
mod kind;
mod summary;
mod telemetry;

pub use alert::{Alert, AlertSeverity};
pub use common::{Record, Source};
pub use device::{Device, DeviceStatus};
pub use intrusion::IntrusionEvent;
pub use kind::{Entity, EntityKind, EntityRef, ResourceKind};
pub use summary::DashboardSummary;
pub use telemetry::TelemetryReading;
