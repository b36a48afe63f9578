//! Shared configuration for the SIAC-IoT command-line tools.
//!
//! TOML profiles merged with `SIAC_` environment variables, a keyring-backed
//! token store, and translation to `siac_core::SyncConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use siac_api::{CredentialStore, MemoryCredentialStore, StoredToken};
use siac_core::{FetchLimits, PollSchedule, ReconnectConfig, SyncConfig, TlsMode};
use thiserror::Error;
use tracing::debug;

/// Keyring service name; entries are `{profile}/token`.
pub const KEYRING_SERVICE: &str = "siac";

/// Environment variable holding a bearer token that overrides the keyring.
pub const TOKEN_ENV: &str = "SIAC_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not defined")]
    NoProfile { profile: String },

    #[error("credential store error: {0}")]
    Credentials(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::NoProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Backend root URL (e.g., "http://localhost:8000").
    pub api_url: String,

    /// Event stream URL. Derived from `api_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,

    /// Username offered by `siac login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,

    /// Resource name → poll interval in seconds; `0` disables polling.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub poll: BTreeMap<String, u64>,

    /// Whether to connect the event stream. Default: true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrusion_limit: Option<u32>,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
}

impl Profile {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "siac", "siac").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("siac");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys use a double underscore: `SIAC_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SIAC_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if the file is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile → runtime config ────────────────────────────────────────

/// Build a `SyncConfig` from a profile and the global defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let api_url: url::Url = profile.api_url.parse().map_err(|_| {
        ConfigError::validation("api_url", format!("invalid URL: {}", profile.api_url))
    })?;

    let mut config =
        SyncConfig::new(api_url).map_err(|e| ConfigError::validation("api_url", e.to_string()))?;

    if let Some(ref raw) = profile.stream_url {
        config.stream_url = raw
            .parse()
            .map_err(|_| ConfigError::validation("stream_url", format!("invalid URL: {raw}")))?;
    }

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    let fallback = ReconnectConfig::default();
    config.reconnect = ReconnectConfig {
        delay: profile
            .reconnect_delay_ms
            .map_or(fallback.delay, Duration::from_millis),
        max_attempts: profile.max_reconnect_attempts.unwrap_or(fallback.max_attempts),
    };

    let named = profile.poll.iter().map(|(name, secs)| (name.as_str(), *secs));
    config.poll =
        PollSchedule::from_named(named).map_err(|e| ConfigError::validation("poll", e.to_string()))?;

    let limits = FetchLimits::default();
    config.limits = FetchLimits {
        telemetry: profile.telemetry_limit.unwrap_or(limits.telemetry),
        intrusions: profile.intrusion_limit.unwrap_or(limits.intrusions),
    };

    config.stream_enabled = profile.stream.unwrap_or(true);
    Ok(config)
}

// ── Credentials ─────────────────────────────────────────────────────

/// Token store backed by the platform keyring.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    profile: String,
}

impl KeyringCredentialStore {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, siac_api::Error> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{}/token", self.profile))
            .map_err(|e| siac_api::Error::Credentials(e.to_string()))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<StoredToken>, siac_api::Error> {
        match self.entry()?.get_password() {
            Ok(raw) => StoredToken::from_json(&raw).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(siac_api::Error::Credentials(e.to_string())),
        }
    }

    fn save(&self, token: &StoredToken) -> Result<(), siac_api::Error> {
        self.entry()?
            .set_password(&token.to_json()?)
            .map_err(|e| siac_api::Error::Credentials(e.to_string()))
    }

    fn clear(&self) -> Result<(), siac_api::Error> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(siac_api::Error::Credentials(e.to_string())),
        }
    }
}

/// The credential store for `profile`: `SIAC_TOKEN` when set, else the
/// keyring.
pub fn credential_store(profile: &str) -> Arc<dyn CredentialStore> {
    credential_store_with(profile, std::env::var(TOKEN_ENV).ok())
}

fn credential_store_with(profile: &str, env_token: Option<String>) -> Arc<dyn CredentialStore> {
    match env_token.filter(|token| !token.trim().is_empty()) {
        Some(token) => {
            debug!("using bearer token from {TOKEN_ENV}");
            Arc::new(MemoryCredentialStore::with_token(StoredToken::issued(
                SecretString::from(token),
                Utc::now(),
            )))
        }
        None => Arc::new(KeyringCredentialStore::new(profile)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use siac_core::ResourceKind;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut profile = Profile::new("http://localhost:8000");
        profile.poll.insert("devices".into(), 5);
        profile.stream = Some(false);
        let mut config = Config::default();
        config.profiles.insert("lab".into(), profile);
        config.default_profile = Some("lab".into());

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn parses_poll_table_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "home"

[profiles.home]
api_url = "https://iot.example.com"
reconnect_delay_ms = 500
max_reconnect_attempts = 2

[profiles.home.poll]
alerts = 3
summary = 0
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "home");

        let sync = profile_to_sync_config(profile, &config.defaults).unwrap();
        assert_eq!(sync.stream_url.as_str(), "wss://iot.example.com/ws");
        assert_eq!(sync.reconnect.delay, Duration::from_millis(500));
        assert_eq!(sync.reconnect.max_attempts, 2);
        assert_eq!(sync.poll.interval(ResourceKind::Alerts), Some(Duration::from_secs(3)));
        assert_eq!(sync.poll.interval(ResourceKind::Summary), None);
        assert_eq!(sync.poll.interval(ResourceKind::Devices), Some(Duration::from_secs(15)));
        assert!(sync.stream_enabled);
    }

    #[test]
    fn unknown_poll_resource_is_rejected() {
        let mut profile = Profile::new("http://localhost:8000");
        profile.poll.insert("weather".into(), 10);

        let err = profile_to_sync_config(&profile, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "poll"));
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let profile = Profile::new("not a url");
        let err = profile_to_sync_config(&profile, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api_url"));
    }

    #[test]
    fn tls_follows_profile_then_defaults() {
        let mut profile = Profile::new("https://iot.example.com");
        let defaults = Defaults {
            insecure: true,
            ..Defaults::default()
        };
        let sync = profile_to_sync_config(&profile, &defaults).unwrap();
        assert_eq!(sync.tls, TlsMode::DangerAcceptInvalid);

        profile.insecure = Some(false);
        profile.ca_cert = Some(PathBuf::from("/etc/siac/ca.pem"));
        let sync = profile_to_sync_config(&profile, &defaults).unwrap();
        assert_eq!(sync.tls, TlsMode::CustomCa(PathBuf::from("/etc/siac/ca.pem")));
    }

    #[test]
    fn unknown_profile_is_reported() {
        let config = Config::default();
        let err = config.profile(Some("lab")).unwrap_err();
        assert!(matches!(err, ConfigError::NoProfile { ref profile } if profile == "lab"));
    }

    #[test]
    fn env_token_overrides_keyring() {
        let store = credential_store_with("default", Some("abc123".into()));
        let token = store.load().unwrap().unwrap();
        assert_eq!(token.token.expose_secret(), "abc123");
        assert!(!token.is_expired());
    }
}
