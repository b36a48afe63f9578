// In-process fakes for the backend and the event stream.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use secrecy::SecretString;
use siac_api::{Connector, EventSocket, Frame};
use tokio::sync::{Semaphore, mpsc};
use url::Url;

use crate::action::Action;
use crate::backend::{ActionResponse, Backend, Snapshot};
use crate::error::CoreError;
use crate::model::{DashboardSummary, ResourceKind};

fn failure(message: &str) -> CoreError {
    CoreError::Api {
        message: message.to_owned(),
        status: Some(500),
    }
}

/// Scripted [`Backend`]. Fetches return the last snapshot set for the
/// resource (empty by default); actions pop scripted responses and default
/// to an empty success. A gated backend holds every action until
/// [`release`](Self::release).
pub(crate) struct FakeBackend {
    snapshots: Mutex<HashMap<ResourceKind, Result<Snapshot, String>>>,
    responses: Mutex<VecDeque<Result<ActionResponse, String>>>,
    executed: Mutex<Vec<Action>>,
    fetches: Mutex<Vec<ResourceKind>>,
    fetch_delay: Mutex<Duration>,
    gate: Option<Semaphore>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            responses: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.resource(), Ok(snapshot));
    }

    pub fn fail_fetch(&self, resource: ResourceKind, message: &str) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(resource, Err(message.to_owned()));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn respond_next(&self, response: ActionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail_next_action(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_owned()));
    }

    pub fn release(&self, actions: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(actions);
        }
    }

    pub fn executed(&self) -> Vec<Action> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, resource: ResourceKind) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|r| **r == resource)
            .count()
    }
}

impl Backend for FakeBackend {
    async fn fetch(&self, resource: ResourceKind) -> Result<Snapshot, CoreError> {
        self.fetches.lock().unwrap().push(resource);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.snapshots.lock().unwrap().get(&resource).cloned();
        match scripted {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(failure(&message)),
            None => Ok(match resource {
                ResourceKind::Devices => Snapshot::Devices(Vec::new()),
                ResourceKind::Alerts => Snapshot::Alerts(Vec::new()),
                ResourceKind::Telemetry => Snapshot::Telemetry(Vec::new()),
                ResourceKind::Intrusions => Snapshot::Intrusions(Vec::new()),
                ResourceKind::Summary => Snapshot::Summary(DashboardSummary::default()),
            }),
        }
    }

    async fn execute(&self, action: &Action) -> Result<ActionResponse, CoreError> {
        self.executed.lock().unwrap().push(action.clone());
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| failure("gate closed"))?
                .forget();
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(failure(&message)),
            None => Ok(ActionResponse::Empty),
        }
    }
}

/// Event-stream connector fed from a channel. The first `connect` yields a
/// socket reading the channel; later ones (and all of them when refusing)
/// fail.
pub(crate) struct ChannelConnector {
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedSender<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    pub fn refusing() -> Self {
        Self {
            inbound: Mutex::new(None),
        }
    }
}

pub(crate) struct ChannelSocket {
    inbound: mpsc::UnboundedReceiver<Frame>,
}

impl Connector for ChannelConnector {
    type Socket = ChannelSocket;

    async fn connect(
        &self,
        _url: &Url,
        _bearer: Option<&SecretString>,
    ) -> Result<ChannelSocket, siac_api::Error> {
        let inbound = self.inbound.lock().unwrap().take();
        inbound
            .map(|inbound| ChannelSocket { inbound })
            .ok_or_else(|| siac_api::Error::WebSocketConnect("connection refused".into()))
    }
}

impl EventSocket for ChannelSocket {
    async fn recv(&mut self) -> Option<Result<Frame, siac_api::Error>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send_text(&mut self, _text: String) -> Result<(), siac_api::Error> {
        Ok(())
    }

    async fn close(&mut self) {}
}
