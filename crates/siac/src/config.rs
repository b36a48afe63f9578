//! CLI configuration: thin wrapper around `siac_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --insecure, --timeout).

use std::sync::Arc;

use siac_api::CredentialStore;
use siac_core::SyncConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use siac_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Everything a backend-facing command needs.
pub struct Context {
    pub profile: String,
    pub sync: SyncConfig,
    pub credentials: Arc<dyn CredentialStore>,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the command context from the config file, profile and flags.
///
/// Without a matching profile, `--api-url` alone is enough.
pub fn resolve(global: &GlobalOpts) -> Result<Context, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match (cfg.profiles.get(&profile_name), &global.api_url) {
        (Some(profile), _) => profile.clone(),
        (None, Some(url)) => Profile::new(url.clone()),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref url) = global.api_url {
        if *url != profile.api_url {
            profile.api_url.clone_from(url);
            profile.stream_url = None;
        }
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let sync = siac_config::profile_to_sync_config(&profile, &cfg.defaults)?;
    let credentials = siac_config::credential_store(&profile_name);
    tracing::debug!(profile = %profile_name, api_url = %sync.api_url, "resolved backend");

    Ok(Context {
        profile: profile_name,
        sync,
        credentials,
    })
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
