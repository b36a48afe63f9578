//! `watch`: run the full sync loop and print every change as it lands.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use serde::Serialize;
use siac_api::TungsteniteConnector;
use siac_core::{
    Alert, ApiBackend, Controller, Device, Entity, EntityChange, EntityCollection, ResourceKind,
    Subscription, TelemetryReading,
};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

const DEFAULT_RESOURCES: [ResourceKind; 2] = [ResourceKind::Devices, ResourceKind::Alerts];

#[derive(Debug, Clone, Copy)]
struct Style {
    json: bool,
    color: bool,
}

/// One change as emitted in JSON mode.
#[derive(Serialize)]
struct ChangeLine<'a, T> {
    change: &'static str,
    kind: String,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
}

/// Text summary of one entity for the human-readable feed.
trait Describe {
    fn describe(&self, color: bool) -> String;
}

impl Describe for Device {
    fn describe(&self, color: bool) -> String {
        format!(
            "{} [{}]",
            self.display_name(),
            output::paint_status(self.status, color)
        )
    }
}

impl Describe for Alert {
    fn describe(&self, color: bool) -> String {
        let state = match (self.resolved, self.acknowledged) {
            (true, _) => " resolved",
            (false, true) => " acknowledged",
            (false, false) => "",
        };
        format!(
            "{} on {} score {:.2}{state}",
            output::paint_severity(self.severity, color),
            self.device_id,
            self.score
        )
    }
}

impl Describe for TelemetryReading {
    fn describe(&self, _color: bool) -> String {
        let mut parts = Vec::new();
        if let Some(t) = self.temperature {
            parts.push(format!("{t:.1}°C"));
        }
        if let Some(h) = self.humidity {
            parts.push(format!("{h:.1}%"));
        }
        if let Some(m) = self.motion {
            parts.push(if m { "motion" } else { "still" }.to_owned());
        }
        parts.push(format!("tx {} rx {}", self.tx_bytes, self.rx_bytes));
        parts.join(" ")
    }
}

fn change_line<T>(change: &EntityChange<T>, style: Style) -> String
where
    T: Entity + Serialize + Describe,
{
    let (tag, value) = match change {
        EntityChange::Upserted {
            value, previous, ..
        } => (
            if previous.is_some() { "updated" } else { "added" },
            Some(value.as_ref()),
        ),
        EntityChange::Removed { .. } => ("removed", None),
    };

    if style.json {
        let line = ChangeLine {
            change: tag,
            kind: T::KIND.to_string(),
            key: change.key(),
            value,
        };
        return serde_json::to_string(&line).unwrap_or_default();
    }

    let marker = match (tag, style.color) {
        ("added", true) => "+".green().to_string(),
        ("removed", true) => "-".red().to_string(),
        ("updated", true) => "~".yellow().to_string(),
        ("added", false) => "+".into(),
        ("removed", false) => "-".into(),
        _ => "~".into(),
    };
    let body = value.map(|v| v.describe(style.color)).unwrap_or_default();
    format!("{marker} {} {} {body}", T::KIND, change.key())
        .trim_end()
        .to_owned()
}

fn follow<T>(collection: &EntityCollection<T>, style: Style) -> Subscription
where
    T: Entity + Serialize + Describe,
{
    collection.on_change(move |change| println!("{}", change_line(change, style)))
}

pub async fn handle(args: WatchArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let resources = if args.resources.is_empty() {
        DEFAULT_RESOURCES.to_vec()
    } else {
        args.resources
    };
    let style = Style {
        json: matches!(global.output, OutputFormat::Json | OutputFormat::JsonCompact),
        color: output::should_color(&global.color),
    };

    let mut sync = ctx.sync.clone();
    sync.resources.clone_from(&resources);
    let backend = ApiBackend::from_config(&sync, Arc::clone(&ctx.credentials))?;
    let controller = Controller::new(sync, backend, TungsteniteConnector);

    let mut notices = controller.notices();
    let mut connection = controller.connection_state();
    controller.start().await?;

    let store = controller.store();
    if !global.quiet {
        eprintln!(
            "watching {} ({} devices, {} active alerts); Ctrl-C to stop",
            resources
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            store.devices().len(),
            store.alerts().len(),
        );
    }

    let mut subscriptions = Vec::new();
    for resource in &resources {
        match resource {
            ResourceKind::Devices => subscriptions.push(follow(store.devices(), style)),
            ResourceKind::Alerts => subscriptions.push(follow(store.alerts(), style)),
            ResourceKind::Telemetry => subscriptions.push(follow(store.telemetry(), style)),
            ResourceKind::Intrusions | ResourceKind::Summary => {}
        }
    }

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            notice = notices.recv() => match notice {
                Ok(notice) => tracing::warn!("{notice}"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                if !global.quiet {
                    eprintln!("stream {state}");
                }
            }
        }
    }

    drop(subscriptions);
    controller.shutdown().await;
    Ok(())
}
