// ── Transient user-facing notices ──

use serde::Serialize;

use crate::model::ResourceKind;

/// Something a UI should flash briefly. Broadcast by the controller; missing
/// one is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A snapshot fetch failed; the store still holds the previous data.
    FetchFailed {
        resource: ResourceKind,
        message: String,
    },
    /// The event stream exhausted its reconnect attempts.
    StreamGaveUp { attempts: u32 },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchFailed { resource, message } => {
                write!(f, "refreshing {resource} failed: {message}")
            }
            Self::StreamGaveUp { attempts } => write!(
                f,
                "live updates stopped after {attempts} reconnect attempts"
            ),
        }
    }
}
