// siac-core: Reconciled view-model between siac-api and consumers (CLI).

pub mod action;
pub mod backend;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod notice;
pub mod store;
pub mod stream;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{
    Action, ActionDispatcher, ActionKind, ActionOutcome, ActionState, Confirmed, DevicePatch,
    NewDevice, PendingAction,
};
pub use backend::{ActionResponse, ApiBackend, Backend, Snapshot};
pub use config::{FetchLimits, PollSchedule, SyncConfig, derive_stream_url};
pub use controller::Controller;
pub use error::CoreError;
pub use fetcher::{RefreshOutcome, SnapshotFetcher};
pub use notice::Notice;
pub use store::{
    DataStore, EntityChange, EntityCollection, PushApplied, SnapshotDiff, Subscription,
    UpsertOutcome,
};
pub use stream::{AlertFilter, ChangeFeed, DeviceFilter, EntityStream, EntityWatchStream};

// Connection types come from the transport layer unchanged.
pub use siac_api::{ConnectionState, ReconnectConfig, TlsMode};

pub use model::{
    Alert, AlertSeverity, DashboardSummary, Device, DeviceStatus, Entity, EntityKind, EntityRef,
    IntrusionEvent, Record, ResourceKind, Source, TelemetryReading,
};
