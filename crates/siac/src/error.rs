//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use siac_config::ConfigError;
use siac_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to backend at {url}")]
    #[diagnostic(
        code(siac::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(siac::timeout),
        help("Increase the timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(siac::auth_failed),
        help(
            "Log in again with: siac login --profile {profile}\n\
             Or set SIAC_TOKEN to a valid bearer token."
        )
    )]
    AuthFailed { profile: String, message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(siac::not_found),
        help("Run: siac {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Could not refresh {resource}: {message}")]
    #[diagnostic(code(siac::fetch_failed))]
    FetchFailed { resource: String, message: String },

    // ── Actions ──────────────────────────────────────────────────────

    #[error("Change to {target} was rejected: {message}")]
    #[diagnostic(
        code(siac::action_failed),
        help("Nothing was changed. Fix the cause and run the command again.")
    )]
    ActionFailed { target: String, message: String },

    #[error("Another change to {target} is still in flight")]
    #[diagnostic(code(siac::action_pending), help("Wait for it to finish and retry."))]
    ActionPending { target: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(siac::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(siac::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(siac::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: siac config init --name {name} --api-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(siac::no_config),
        help(
            "Create a profile with: siac config init --api-url <URL>\n\
             Or pass --api-url. Config file: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(siac::config))]
    Config { message: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(siac::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(siac::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ActionPending { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to authentication failures.
    pub fn for_profile(self, name: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: name.into(),
                message,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: format!("{entity_type} list"),
                resource_type: entity_type.trim_end_matches('s').to_owned(),
                identifier,
            },

            CoreError::Fetch { resource, message } => CliError::FetchFailed { resource, message },

            CoreError::ActionFailed { target, message } => CliError::ActionFailed {
                target: target.to_string(),
                message,
            },

            CoreError::ActionPending { target } => CliError::ActionPending {
                target: target.to_string(),
            },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<siac_api::Error> for CliError {
    fn from(err: siac_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use siac_core::{EntityKind, EntityRef};

    #[test]
    fn not_found_names_the_list_command() {
        let err = CliError::from(CoreError::NotFound {
            entity_type: "devices".into(),
            identifier: "esp32-9".into(),
        });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        let CliError::NotFound {
            resource_type,
            list_command,
            ..
        } = err
        else {
            panic!("expected NotFound");
        };
        assert_eq!(resource_type, "device");
        assert_eq!(list_command, "devices list");
    }

    #[test]
    fn pending_action_is_a_conflict() {
        let err = CliError::from(CoreError::ActionPending {
            target: EntityRef::new(EntityKind::Alert, "17"),
        });
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
    }

    #[test]
    fn auth_failure_carries_profile() {
        let err = CliError::from(CoreError::AuthenticationFailed {
            message: "expired".into(),
        })
        .for_profile("lab");
        assert!(matches!(err, CliError::AuthFailed { ref profile, .. } if profile == "lab"));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
