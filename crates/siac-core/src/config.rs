// ── Runtime sync configuration ──
//
// These types describe *what* to sync and how often. They are constructed
// by the CLI (from siac-config profiles) or by tests. Core never reads
// config files.

use std::collections::BTreeMap;
use std::time::Duration;

use siac_api::{ReconnectConfig, TlsMode};
use url::Url;

use crate::error::CoreError;
use crate::model::ResourceKind;

/// Row limits for the "recent" endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub telemetry: u32,
    pub intrusions: u32,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            telemetry: 50,
            intrusions: 50,
        }
    }
}

/// Poll interval per resource. A resource without an entry is fetched
/// once at start and never polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    intervals: BTreeMap<ResourceKind, Duration>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            intervals: ResourceKind::ALL
                .into_iter()
                .map(|r| (r, r.default_poll_interval()))
                .collect(),
        }
    }
}

impl PollSchedule {
    pub fn empty() -> Self {
        Self {
            intervals: BTreeMap::new(),
        }
    }

    /// Build from `name → seconds` pairs. Unknown names are rejected,
    /// zero disables polling for that resource.
    pub fn from_named<'a, I>(entries: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut schedule = Self::default();
        for (name, secs) in entries {
            let resource = ResourceKind::parse(name)?;
            schedule.set(resource, Duration::from_secs(secs));
        }
        Ok(schedule)
    }

    pub fn set(&mut self, resource: ResourceKind, interval: Duration) {
        if interval.is_zero() {
            self.intervals.remove(&resource);
        } else {
            self.intervals.insert(resource, interval);
        }
    }

    pub fn interval(&self, resource: ResourceKind) -> Option<Duration> {
        self.intervals.get(&resource).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, Duration)> + '_ {
        self.intervals.iter().map(|(r, d)| (*r, *d))
    }
}

/// Everything the [`Controller`](crate::Controller) needs to run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend root, e.g. `http://localhost:8000`.
    pub api_url: Url,
    /// Event stream endpoint, e.g. `ws://localhost:8000/ws`.
    pub stream_url: Url,
    pub tls: TlsMode,
    pub timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Resources loaded at start.
    pub resources: Vec<ResourceKind>,
    pub poll: PollSchedule,
    pub limits: FetchLimits,
    pub stream_enabled: bool,
}

impl SyncConfig {
    /// Defaults for a backend at `api_url`, with the stream URL derived.
    pub fn new(api_url: Url) -> Result<Self, CoreError> {
        let stream_url = derive_stream_url(&api_url)?;
        Ok(Self {
            api_url,
            stream_url,
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            resources: ResourceKind::ALL.to_vec(),
            poll: PollSchedule::default(),
            limits: FetchLimits::default(),
            stream_enabled: true,
        })
    }
}

/// `http(s)://host[:port]/...` → `ws(s)://host[:port]/ws`.
pub fn derive_stream_url(api_url: &Url) -> Result<Url, CoreError> {
    let scheme = match api_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(CoreError::config(format!(
                "cannot derive an event stream URL from `{other}` scheme"
            )));
        }
    };
    let host = api_url
        .host_str()
        .ok_or_else(|| CoreError::config(format!("API URL `{api_url}` has no host")))?;
    let authority = match api_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Url::parse(&format!("{scheme}://{authority}/ws"))
        .map_err(|e| CoreError::config(format!("invalid stream URL: {e}")))
}
