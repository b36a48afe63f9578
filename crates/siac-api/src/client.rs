// REST client for the SIAC-IoT backend
//
// Wraps `reqwest::Client` with `/api/v1` URL construction, bearer token
// injection from a `CredentialStore`, and `{"detail": ...}` error decoding.
// Endpoint methods sit at the bottom of this file.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::{self, CredentialStore, StoredToken};
use crate::error::Error;
use crate::models::{
    AlertRecord, AuthRequest, AuthResponse, DashboardSummary, DeviceCreate, DeviceRecord,
    DeviceUpdate, ErrorBody, IdsLogRecord, TelemetryRecord,
};
use crate::transport::TransportConfig;

const API_PREFIX: [&str; 2] = ["api", "v1"];

/// HTTP client for the backend's `/api/v1` surface.
///
/// Every request consults the credential store; a non-expired token is sent
/// as `Authorization: Bearer <token>`, otherwise the request goes out
/// unauthenticated and the backend decides.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root, e.g. `http://localhost:8000`.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: transport.timeout,
            credentials,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            base_url,
            timeout: TransportConfig::default().timeout,
            credentials,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/v1/{segments...}`, each segment percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn api_url_with_limit(&self, segments: &[&str], limit: u32) -> Result<Url, Error> {
        let mut url = self.api_url(segments)?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request and return the raw body, or `None` for an empty
    /// success (204 or zero-length body).
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<Option<String>, Error> {
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if let Some(token) = auth::active_token(self.credentials.as_ref()) {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_transport(e))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: detail_message(&text)
                    .unwrap_or_else(|| "token missing, expired or rejected".into()),
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: detail_message(&text).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_owned()
                }),
            });
        }
        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let body = self.send(Method::GET, url, None).await?;
        decode(&body.unwrap_or_default())
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<&impl Serialize>,
    ) -> Result<Option<T>, Error> {
        let body = body.map(encode).transpose()?;
        self.send(Method::POST, url, body)
            .await?
            .map(|text| decode(&text))
            .transpose()
    }

    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<Option<T>, Error> {
        self.send(Method::PUT, url, Some(encode(body)?))
            .await?
            .map(|text| decode(&text))
            .transpose()
    }

    pub(crate) async fn delete(&self, url: Url) -> Result<(), Error> {
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(e)
        }
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// `POST /auth/login`. On success the token is stored with a 24 h
    /// expiry and returned.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<StoredToken, Error> {
        let request = AuthRequest {
            username: username.to_owned(),
            password: password.expose_secret().to_owned(),
        };
        let url = self.api_url(&["auth", "login"])?;
        let response: AuthResponse = self
            .post(url, Some(&request))
            .await
            .map_err(|e| match e {
                Error::Api { status: 400 | 403, message } => Error::Authentication { message },
                other => other,
            })?
            .ok_or_else(|| Error::Authentication {
                message: "login returned an empty body".into(),
            })?;

        let token = StoredToken::issued(SecretString::from(response.access_token), Utc::now());
        self.credentials.save(&token)?;
        Ok(token)
    }

    /// Drop the stored token. The backend keeps no session to revoke.
    pub fn logout(&self) -> Result<(), Error> {
        self.credentials.clear()
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.get(self.api_url(&["devices"])?).await
    }

    pub async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, Error> {
        self.get(self.api_url(&["devices", device_id])?).await
    }

    pub async fn create_device(&self, body: &DeviceCreate) -> Result<Option<DeviceRecord>, Error> {
        self.post(self.api_url(&["devices"])?, Some(body)).await
    }

    pub async fn update_device(
        &self,
        device_id: &str,
        body: &DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, Error> {
        self.put(self.api_url(&["devices", device_id])?, body).await
    }

    pub async fn delete_device(&self, device_id: &str) -> Result<(), Error> {
        self.delete(self.api_url(&["devices", device_id])?).await
    }

    // ── Alerts ───────────────────────────────────────────────────────

    pub async fn list_active_alerts(&self) -> Result<Vec<AlertRecord>, Error> {
        self.get(self.api_url(&["alerts", "active"])?).await
    }

    pub async fn list_recent_alerts(&self, limit: u32) -> Result<Vec<AlertRecord>, Error> {
        self.get(self.api_url_with_limit(&["alerts", "recent"], limit)?)
            .await
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>, Error> {
        self.post(self.api_url(&["alerts", alert_id, "ack"])?, None::<&()>)
            .await
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>, Error> {
        self.post(self.api_url(&["alerts", alert_id, "resolve"])?, None::<&()>)
            .await
    }

    // ── Telemetry / IDS / summary ────────────────────────────────────

    pub async fn recent_telemetry(&self, limit: u32) -> Result<Vec<TelemetryRecord>, Error> {
        self.get(self.api_url_with_limit(&["telemetry", "recent"], limit)?)
            .await
    }

    pub async fn recent_ids_logs(&self, limit: u32) -> Result<Vec<IdsLogRecord>, Error> {
        self.get(self.api_url_with_limit(&["suricata", "recent"], limit)?)
            .await
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, Error> {
        self.get(self.api_url(&["dashboard_summary"])?).await
    }
}

fn encode(body: &impl Serialize) -> Result<serde_json::Value, Error> {
    serde_json::to_value(body).map_err(|e| Error::Deserialization {
        message: format!("failed to encode request body: {e}"),
        body: String::new(),
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}

/// Pull a human message out of a `{"detail": ...}` body. String details are
/// used as-is; structured ones (validation errors) are re-serialized.
fn detail_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
