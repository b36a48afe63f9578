// ── Core error types ──
//
// User-facing errors from siac-core. Consumers never see raw HTTP or JSON
// failures; `From<siac_api::Error>` translates them into domain variants.

use thiserror::Error;

use crate::model::EntityRef;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Backend request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Failed to fetch {resource}: {message}")]
    Fetch { resource: String, message: String },

    // ── Action errors ────────────────────────────────────────────────
    #[error("Action on {target} failed and was rolled back: {message}")]
    ActionFailed { target: EntityRef, message: String },

    #[error("An action on {target} is already in flight")]
    ActionPending { target: EntityRef },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if logging in again might resolve the error.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<siac_api::Error> for CoreError {
    fn from(err: siac_api::Error) -> Self {
        match err {
            siac_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            siac_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            siac_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            siac_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            siac_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            siac_api::Error::Api { status: 404, message } => CoreError::NotFound {
                entity_type: "resource".into(),
                identifier: message,
            },
            siac_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            siac_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            siac_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("stream closed ({code}): {reason}"),
            },
            siac_api::Error::NotConnected => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "event stream is not connected".into(),
            },
            siac_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                status: None,
            },
            siac_api::Error::Credentials(message) => CoreError::Internal(message),
        }
    }
}
