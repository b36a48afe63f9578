//! Command handlers. Each backend-facing command runs against a
//! short-lived `Controller` scoped to the resources it needs.

pub mod alerts;
pub mod auth;
pub mod config_cmd;
pub mod devices;
pub mod summary;
pub mod telemetry;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(args, ctx, global).await,
        Command::Logout => auth::logout(ctx, global),
        Command::Devices(args) => devices::handle(args, ctx, global).await,
        Command::Alerts(args) => alerts::handle(args, ctx, global).await,
        Command::Telemetry(args) => telemetry::handle_telemetry(args, ctx, global).await,
        Command::Intrusions => telemetry::handle_intrusions(ctx, global).await,
        Command::Summary => summary::handle(ctx, global).await,
        Command::Watch(args) => watch::handle(args, ctx, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
