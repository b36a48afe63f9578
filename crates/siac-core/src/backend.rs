// ── Backend seam ──
//
// The fetcher and dispatcher talk to the backend through this trait so the
// sync logic can run against an in-process fake. `ApiBackend` is the real
// implementation over `siac_api::ApiClient`.

use std::future::Future;
use std::sync::Arc;

use siac_api::{ApiClient, CredentialStore, TransportConfig};
use siac_api::models::{DeviceCreate, DeviceUpdate};

use crate::action::Action;
use crate::config::{FetchLimits, SyncConfig};
use crate::error::CoreError;
use crate::model::{
    Alert, DashboardSummary, Device, IntrusionEvent, ResourceKind, TelemetryReading,
};

/// A full point-in-time list for one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Devices(Vec<Device>),
    Alerts(Vec<Alert>),
    Telemetry(Vec<TelemetryReading>),
    Intrusions(Vec<IntrusionEvent>),
    Summary(DashboardSummary),
}

impl Snapshot {
    pub fn resource(&self) -> ResourceKind {
        match self {
            Self::Devices(_) => ResourceKind::Devices,
            Self::Alerts(_) => ResourceKind::Alerts,
            Self::Telemetry(_) => ResourceKind::Telemetry,
            Self::Intrusions(_) => ResourceKind::Intrusions,
            Self::Summary(_) => ResourceKind::Summary,
        }
    }

    /// Row count; the summary counts as one.
    pub fn len(&self) -> usize {
        match self {
            Self::Devices(v) => v.len(),
            Self::Alerts(v) => v.len(),
            Self::Telemetry(v) => v.len(),
            Self::Intrusions(v) => v.len(),
            Self::Summary(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a mutation endpoint sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Device(Device),
    Alert(Alert),
    /// 204 or an empty body.
    Empty,
}

/// Request/response access to the backend.
pub trait Backend: Send + Sync + 'static {
    fn fetch(
        &self,
        resource: ResourceKind,
    ) -> impl Future<Output = Result<Snapshot, CoreError>> + Send;

    fn execute(
        &self,
        action: &Action,
    ) -> impl Future<Output = Result<ActionResponse, CoreError>> + Send;

    /// Credentials the event stream should authenticate with.
    fn credentials(&self) -> Option<Arc<dyn CredentialStore>> {
        None
    }
}

/// [`Backend`] over the REST API.
pub struct ApiBackend {
    client: ApiClient,
    limits: FetchLimits,
}

impl ApiBackend {
    pub fn new(client: ApiClient, limits: FetchLimits) -> Self {
        Self { client, limits }
    }

    /// Build the HTTP client from `config`.
    pub fn from_config(
        config: &SyncConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: config.tls.clone(),
            timeout: config.timeout,
        };
        let client = ApiClient::new(config.api_url.clone(), &transport, credentials)?;
        Ok(Self::new(client, config.limits))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

impl Backend for ApiBackend {
    async fn fetch(&self, resource: ResourceKind) -> Result<Snapshot, CoreError> {
        let snapshot = match resource {
            ResourceKind::Devices => Snapshot::Devices(
                self.client
                    .list_devices()
                    .await?
                    .into_iter()
                    .map(Device::from)
                    .collect(),
            ),
            ResourceKind::Alerts => Snapshot::Alerts(
                self.client
                    .list_active_alerts()
                    .await?
                    .into_iter()
                    .map(Alert::from)
                    .collect(),
            ),
            ResourceKind::Telemetry => Snapshot::Telemetry(
                self.client
                    .recent_telemetry(self.limits.telemetry)
                    .await?
                    .into_iter()
                    .map(TelemetryReading::from)
                    .collect(),
            ),
            ResourceKind::Intrusions => Snapshot::Intrusions(
                self.client
                    .recent_ids_logs(self.limits.intrusions)
                    .await?
                    .into_iter()
                    .map(IntrusionEvent::from)
                    .collect(),
            ),
            ResourceKind::Summary => {
                Snapshot::Summary(self.client.dashboard_summary().await?.into())
            }
        };
        Ok(snapshot)
    }

    async fn execute(&self, action: &Action) -> Result<ActionResponse, CoreError> {
        let response = match action {
            Action::CreateDevice(new) => self
                .client
                .create_device(&DeviceCreate::from(new))
                .await?
                .map(|d| ActionResponse::Device(d.into())),
            Action::UpdateDevice { device_id, patch } => self
                .client
                .update_device(device_id, &DeviceUpdate::from(patch))
                .await?
                .map(|d| ActionResponse::Device(d.into())),
            Action::DeleteDevice { device_id } => {
                self.client.delete_device(device_id).await?;
                None
            }
            Action::AcknowledgeAlert { alert_id } => self
                .client
                .acknowledge_alert(alert_id)
                .await?
                .map(|a| ActionResponse::Alert(a.into())),
            Action::ResolveAlert { alert_id } => self
                .client
                .resolve_alert(alert_id)
                .await?
                .map(|a| ActionResponse::Alert(a.into())),
        };
        Ok(response.unwrap_or(ActionResponse::Empty))
    }

    fn credentials(&self) -> Option<Arc<dyn CredentialStore>> {
        Some(Arc::clone(self.client.credentials()))
    }
}
