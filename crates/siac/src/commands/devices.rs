//! Device command handlers.

use std::sync::Arc;

use siac_core::{
    Action, ActionOutcome, Confirmed, Device, DeviceFilter, DevicePatch, NewDevice, ResourceKind,
};
use tabled::Tabled;

use crate::cli::{DeviceFields, DeviceListArgs, DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

impl From<&Arc<Device>> for DeviceRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            id: d.id.clone(),
            name: or_dash(d.name.as_deref()),
            dtype: or_dash(d.device_type.as_deref()),
            status: d.status.to_string(),
            location: or_dash(d.location.as_deref()),
            last_seen: d
                .last_seen
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("ID:        {}", d.id),
        format!("Name:      {}", d.name.as_deref().unwrap_or("-")),
        format!("Type:      {}", d.device_type.as_deref().unwrap_or("-")),
        format!("Firmware:  {}", d.firmware_version.as_deref().unwrap_or("-")),
        format!("Location:  {}", d.location.as_deref().unwrap_or("-")),
        format!("Status:    {}", d.status),
    ];
    if !d.tags.is_empty() {
        lines.push(format!("Tags:      {}", d.tags.join(", ")));
    }
    if let Some(seen) = d.last_seen {
        lines.push(format!("Last seen: {}", seen.to_rfc3339()));
    }
    lines.join("\n")
}

fn filters(args: &DeviceListArgs) -> Vec<DeviceFilter> {
    let mut filters = Vec::new();
    if let Some(status) = args.status {
        filters.push(DeviceFilter::ByStatus(status.into()));
    }
    if let Some(ref location) = args.location {
        filters.push(DeviceFilter::ByLocation(location.clone()));
    }
    if let Some(ref tag) = args.tag {
        filters.push(DeviceFilter::Tagged(tag.clone()));
    }
    filters
}

fn patch_from(fields: DeviceFields) -> DevicePatch {
    DevicePatch {
        name: fields.name,
        device_type: fields.device_type,
        firmware_version: fields.firmware,
        location: fields.location,
        tags: (!fields.tags.is_empty()).then_some(fields.tags),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List(list) => {
            let all = util::oneshot(ctx, &[ResourceKind::Devices], |c| async move {
                Ok(c.store().devices_snapshot())
            })
            .await?;
            let filters = filters(&list);
            let devices: Vec<Arc<Device>> = all
                .iter()
                .filter(|d| filters.iter().all(|f| f.matches(d)))
                .cloned()
                .collect();

            let out =
                output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d.id.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { device } => {
            let found = util::oneshot(ctx, &[ResourceKind::Devices], |c| async move {
                Ok(c.store().devices().get(&device).ok_or(device))
            })
            .await?;
            match found {
                Ok(d) => {
                    let out = output::render_single(&global.output, d.as_ref(), detail, |d| {
                        d.id.clone()
                    })?;
                    output::print_output(&out, global.quiet);
                    Ok(())
                }
                Err(identifier) => Err(CliError::NotFound {
                    resource_type: "device".into(),
                    identifier,
                    list_command: "devices list".into(),
                }),
            }
        }

        DevicesCommand::Create(create) => {
            let new = NewDevice {
                device_id: create.device_id,
                name: create.fields.name,
                device_type: create.fields.device_type,
                firmware_version: create.fields.firmware,
                location: create.fields.location,
                tags: create.fields.tags,
            };
            let outcome = run_action(ctx, Action::CreateDevice(new)).await?;
            report(&outcome, "Device registered", global)
        }

        DevicesCommand::Update { device, fields } => {
            let patch = patch_from(fields);
            if patch.is_empty() {
                return Err(CliError::Validation {
                    field: "fields".into(),
                    reason: "nothing to update; pass at least one of --name, --type, \
                             --firmware, --location, --tag"
                        .into(),
                });
            }
            let action = Action::UpdateDevice {
                device_id: device,
                patch,
            };
            let outcome = run_action(ctx, action).await?;
            report(&outcome, "Device updated", global)
        }

        DevicesCommand::Delete { device } => {
            if !util::confirm(&format!("Delete device {device}?"), global.yes)? {
                return Ok(());
            }
            let outcome = run_action(ctx, Action::DeleteDevice { device_id: device }).await?;
            report(&outcome, "Device deleted", global)
        }
    }
}

async fn run_action(ctx: &Context, action: Action) -> Result<ActionOutcome, CliError> {
    util::oneshot(ctx, &[ResourceKind::Devices], |c| async move {
        c.dispatch(action).await
    })
    .await
}

fn report(outcome: &ActionOutcome, message: &str, global: &GlobalOpts) -> Result<(), CliError> {
    output::print_status(message, global.quiet, output::should_color(&global.color));
    if let Confirmed::Device(ref device) = outcome.confirmed {
        let out = output::render_single(&global.output, device, detail, |d| d.id.clone())?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}
