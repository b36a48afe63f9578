//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use siac_core::{ApiBackend, Controller, CoreError, ResourceKind};

use crate::config::Context;
use crate::error::CliError;

/// Load `resources` into a fresh controller, run `f` against it, and shut
/// it down. No stream, no polling.
pub async fn oneshot<F, Fut, T>(
    ctx: &Context,
    resources: &[ResourceKind],
    f: F,
) -> Result<T, CliError>
where
    F: FnOnce(Controller<ApiBackend>) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut sync = ctx.sync.clone();
    sync.resources = resources.to_vec();
    let backend = ApiBackend::from_config(&sync, Arc::clone(&ctx.credentials))?;

    Controller::<ApiBackend>::oneshot(sync, backend, f)
        .await
        .map_err(|e| CliError::from(e).for_profile(&ctx.profile))
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
