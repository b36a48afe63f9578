use thiserror::Error;

/// Top-level error type for the `siac-api` crate.
///
/// Covers authentication, HTTP transport, backend API errors, the event
/// stream and the local credential store. `siac-core` maps these into
/// user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or the backend answered 401 to a bearer request.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Backend API ─────────────────────────────────────────────────
    /// Non-2xx response. `message` is the `detail` field when present.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Event stream ────────────────────────────────────────────────
    /// WebSocket handshake failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// `send` was called while the stream is not connected.
    #[error("Event stream is not connected")]
    NotConnected,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Credentials ─────────────────────────────────────────────────
    /// Token storage backend failed.
    #[error("Credential store error: {0}")]
    Credentials(String),
}

impl Error {
    /// Returns `true` if the token was rejected and logging in again
    /// might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::Api { status: 401, .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_statuses() {
        let missing = Error::Api {
            status: 404,
            message: "Device not found".into(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_transient());
        assert_eq!(missing.status(), Some(404));

        let unavailable = Error::Api {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(unavailable.is_transient());

        let unauthorized = Error::Api {
            status: 401,
            message: "Invalid token".into(),
        };
        assert!(unauthorized.is_auth_expired());
    }

    #[test]
    fn not_connected_is_not_retried() {
        assert!(!Error::NotConnected.is_transient());
        assert_eq!(Error::NotConnected.status(), None);
    }
}
