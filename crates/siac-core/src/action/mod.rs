// ── Action API ──
//
// All writes flow through `Action` and the `ActionDispatcher`, which shows
// the result optimistically and reconciles it with the backend's answer.

mod dispatcher;
mod requests;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use crate::model::{Alert, Device, EntityKind, EntityRef};

pub use dispatcher::ActionDispatcher;
pub use requests::{DevicePatch, NewDevice};

/// A write against the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Devices ──────────────────────────────────────────────────────
    CreateDevice(NewDevice),
    UpdateDevice {
        device_id: String,
        patch: DevicePatch,
    },
    DeleteDevice {
        device_id: String,
    },

    // ── Alerts ───────────────────────────────────────────────────────
    AcknowledgeAlert {
        alert_id: String,
    },
    ResolveAlert {
        alert_id: String,
    },
}

impl Action {
    /// The entity this action changes. At most one action per target is
    /// in flight.
    pub fn target(&self) -> EntityRef {
        match self {
            Self::CreateDevice(new) => EntityRef::new(EntityKind::Device, new.device_id.clone()),
            Self::UpdateDevice { device_id, .. } | Self::DeleteDevice { device_id } => {
                EntityRef::new(EntityKind::Device, device_id.clone())
            }
            Self::AcknowledgeAlert { alert_id } | Self::ResolveAlert { alert_id } => {
                EntityRef::new(EntityKind::Alert, alert_id.clone())
            }
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateDevice(_) => ActionKind::Create,
            Self::DeleteDevice { .. } => ActionKind::Delete,
            Self::UpdateDevice { .. }
            | Self::AcknowledgeAlert { .. }
            | Self::ResolveAlert { .. } => ActionKind::Update,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

/// Lifecycle of one action. `Confirmed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionState {
    Idle,
    Optimistic,
    Confirmed,
    RolledBack,
}

/// An action that has been accepted and not yet resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub target: EntityRef,
    pub kind: ActionKind,
    pub submitted_at: DateTime<Utc>,
    pub state: ActionState,
}

/// The authoritative result of a confirmed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmed {
    Device(Device),
    Alert(Alert),
    Deleted { device_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub id: Uuid,
    pub target: EntityRef,
    pub kind: ActionKind,
    pub state: ActionState,
    pub confirmed: Confirmed,
}
