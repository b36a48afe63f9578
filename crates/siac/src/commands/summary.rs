//! `summary`: dashboard counters.

use siac_core::{CoreError, DashboardSummary, ResourceKind};

use crate::cli::GlobalOpts;
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

fn detail(s: &DashboardSummary) -> String {
    [
        format!("Devices:          {}", s.total_devices),
        format!("Active alerts:    {}", s.active_alerts),
        format!("Alerts (24h):     {}", s.alerts_24h),
        format!("Anomalies (24h):  {}", s.anomalies_24h),
        format!("Telemetry (24h):  {}", s.telemetry_24h),
        format!("Data today:       {:.2} GB", s.data_volume_today_gb),
        format!(
            "System status:    {}",
            s.system_status.as_deref().unwrap_or("-")
        ),
    ]
    .join("\n")
}

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let summary = util::oneshot(ctx, &[ResourceKind::Summary], |c| async move {
        c.store()
            .summary()
            .ok_or_else(|| CoreError::Internal("summary missing after refresh".into()))
    })
    .await?;

    let out = output::render_single(&global.output, summary.as_ref(), detail, |s| {
        s.total_devices.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
