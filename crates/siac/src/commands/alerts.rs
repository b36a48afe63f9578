//! Alert command handlers.

use std::sync::Arc;

use siac_core::{Action, Alert, AlertFilter, Confirmed, ResourceKind};
use tabled::Tabled;

use crate::cli::{AlertListArgs, AlertsArgs, AlertsCommand, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Ack")]
    acknowledged: String,
    #[tabled(rename = "Raised")]
    raised: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&Arc<Alert>> for AlertRow {
    fn from(a: &Arc<Alert>) -> Self {
        Self {
            id: a.id.clone(),
            device: a.device_id.clone(),
            severity: a.severity.to_string(),
            score: format!("{:.2}", a.score),
            acknowledged: if a.acknowledged { "yes" } else { "no" }.into(),
            raised: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            reason: or_dash(a.reason.as_deref()),
        }
    }
}

fn detail(a: &Alert) -> String {
    [
        format!("ID:           {}", a.id),
        format!("Device:       {}", a.device_id),
        format!("Severity:     {}", a.severity),
        format!("Score:        {:.2}", a.score),
        format!("Raised:       {}", a.timestamp.to_rfc3339()),
        format!("Reason:       {}", a.reason.as_deref().unwrap_or("-")),
        format!("Acknowledged: {}", a.acknowledged),
        format!("Resolved:     {}", a.resolved),
    ]
    .join("\n")
}

fn filters(args: &AlertListArgs) -> Vec<AlertFilter> {
    let mut filters = vec![AlertFilter::Active];
    if args.unacknowledged {
        filters.push(AlertFilter::Unacknowledged);
    }
    if let Some(severity) = args.min_severity {
        filters.push(AlertFilter::MinSeverity(severity.into()));
    }
    if let Some(ref device) = args.device {
        filters.push(AlertFilter::ByDevice(device.clone()));
    }
    filters
}

pub async fn handle(args: AlertsArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let (action, message) = match args.command {
        AlertsCommand::List(list) => {
            let all = util::oneshot(ctx, &[ResourceKind::Alerts], |c| async move {
                Ok(c.store().alerts_snapshot())
            })
            .await?;
            let filters = filters(&list);
            let mut alerts: Vec<Arc<Alert>> = all
                .iter()
                .filter(|a| filters.iter().all(|f| f.matches(a)))
                .cloned()
                .collect();
            alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let out =
                output::render_list(&global.output, &alerts, |a| AlertRow::from(a), |a| a.id.clone())?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }
        AlertsCommand::Acknowledge { alert } => {
            (Action::AcknowledgeAlert { alert_id: alert }, "Alert acknowledged")
        }
        AlertsCommand::Resolve { alert } => {
            (Action::ResolveAlert { alert_id: alert }, "Alert resolved")
        }
    };

    let outcome = util::oneshot(ctx, &[ResourceKind::Alerts], |c| async move {
        c.dispatch(action).await
    })
    .await?;

    output::print_status(message, global.quiet, output::should_color(&global.color));
    if let Confirmed::Alert(ref alert) = outcome.confirmed {
        let out = output::render_single(&global.output, alert, detail, |a| a.id.clone())?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::SeverityArg;
    use chrono::Utc;
    use siac_core::AlertSeverity;

    fn alert(severity: AlertSeverity, acknowledged: bool) -> Alert {
        Alert {
            id: "1".into(),
            device_id: "esp32-1".into(),
            timestamp: Utc::now(),
            severity,
            score: 0.9,
            reason: None,
            acknowledged,
            resolved: false,
            metadata: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn severity_and_ack_filters_apply_together() {
        let args = AlertListArgs {
            unacknowledged: true,
            min_severity: Some(SeverityArg::High),
            device: None,
        };
        let filters = filters(&args);
        let keep = |a: &Alert| filters.iter().all(|f| f.matches(a));

        assert!(keep(&alert(AlertSeverity::Critical, false)));
        assert!(!keep(&alert(AlertSeverity::Medium, false)));
        assert!(!keep(&alert(AlertSeverity::High, true)));
    }
}
