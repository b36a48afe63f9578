//! `login` / `logout`.

use std::io::BufRead;
use std::sync::Arc;

use secrecy::SecretString;
use siac_core::ApiBackend;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::{self, Context};
use crate::error::CliError;
use crate::output;

pub async fn login(args: LoginArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let username = match args.username {
        Some(name) => name,
        None => profile_username(&ctx.profile).ok_or_else(|| CliError::Validation {
            field: "username".into(),
            reason: "pass --username or set `username` in the profile".into(),
        })?,
    };

    let password = if args.password_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        SecretString::from(line.trim_end_matches(['\r', '\n']).to_owned())
    } else {
        SecretString::from(rpassword::prompt_password(format!("Password for {username}: "))?)
    };

    let backend = ApiBackend::from_config(&ctx.sync, Arc::clone(&ctx.credentials))?;
    let token = backend
        .client()
        .login(&username, &password)
        .await
        .map_err(|e| CliError::from(e).for_profile(&ctx.profile))?;

    output::print_status(
        &format!(
            "Logged in as {username} (profile '{}', token valid until {})",
            ctx.profile,
            token.expires_at.format("%Y-%m-%d %H:%M UTC")
        ),
        global.quiet,
        output::should_color(&global.color),
    );
    Ok(())
}

pub fn logout(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.credentials.clear()?;
    output::print_status(
        &format!("Logged out of profile '{}'", ctx.profile),
        global.quiet,
        output::should_color(&global.color),
    );
    Ok(())
}

fn profile_username(profile: &str) -> Option<String> {
    config::load_config_or_default()
        .profiles
        .get(profile)
        .and_then(|p| p.username.clone())
}
