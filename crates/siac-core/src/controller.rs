// ── Controller ──
//
// Owns the store, fetcher, dispatcher and event stream for one backend,
// and the background tasks that tie them together.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use siac_api::{ConnectionState, Connector, StreamClient, StreamEvent, TungsteniteConnector};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionDispatcher, ActionOutcome, PendingAction};
use crate::backend::Backend;
use crate::config::{PollSchedule, SyncConfig};
use crate::error::CoreError;
use crate::fetcher::{RefreshOutcome, SnapshotFetcher};
use crate::model::ResourceKind;
use crate::notice::Notice;
use crate::store::DataStore;

const NOTICE_CHANNEL_SIZE: usize = 64;

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Nothing runs until
/// [`start`](Self::start); [`shutdown`](Self::shutdown) stops everything.
pub struct Controller<B: Backend, C: Connector = TungsteniteConnector> {
    inner: Arc<ControllerInner<B, C>>,
}

impl<B: Backend, C: Connector> Clone for Controller<B, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<B: Backend, C: Connector> {
    config: SyncConfig,
    store: Arc<DataStore>,
    fetcher: Arc<SnapshotFetcher<B>>,
    dispatcher: ActionDispatcher<B>,
    stream: StreamClient<C>,
    notices: broadcast::Sender<Notice>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: Backend, C: Connector> Controller<B, C> {
    /// Wire up the components. Does not fetch or connect.
    pub fn new(config: SyncConfig, backend: B, connector: C) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(DataStore::new());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);

        let fetcher = Arc::new(SnapshotFetcher::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            notices.clone(),
        ));
        let dispatcher = ActionDispatcher::new(Arc::clone(&backend), Arc::clone(&store));
        let stream =
            StreamClient::with_connector(connector, config.reconnect, backend.credentials());

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                fetcher,
                dispatcher,
                stream,
                notices,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn backend(&self) -> &B {
        self.inner.fetcher.backend()
    }

    pub fn stream(&self) -> &StreamClient<C> {
        &self.inner.stream
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load every configured resource, then start the poll schedules, the
    /// event stream, and the tasks feeding it into the store.
    ///
    /// Initial load failures are published as notices; the resource is
    /// retried on its next scheduled tick.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(CoreError::Internal("controller has been shut down".into()));
        }
        let mut handles = inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("controller already started");
            return Ok(());
        }

        let config = &inner.config;
        info!(api_url = %config.api_url, resources = config.resources.len(), "starting sync");

        let results = join_all(
            config
                .resources
                .iter()
                .map(|resource| inner.fetcher.refresh(*resource)),
        )
        .await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, "initial load incomplete");
        }

        for (resource, interval) in config.poll.iter() {
            if !config.resources.contains(&resource) {
                continue;
            }
            handles.push(Arc::clone(&inner.fetcher).spawn_schedule(
                resource,
                interval,
                inner.cancel.child_token(),
            ));
        }

        if config.stream_enabled {
            // Subscribe before connecting so no early event is missed.
            handles.push(tokio::spawn(event_pump(
                Arc::clone(&inner.store),
                inner.stream.subscribe(),
                inner.cancel.child_token(),
            )));
            handles.push(tokio::spawn(state_mirror(
                Arc::clone(&inner.store),
                inner.stream.clone(),
                inner.notices.clone(),
                inner.cancel.child_token(),
            )));
            inner.stream.connect(config.stream_url.clone());
        }

        info!(tasks = handles.len(), "sync started");
        Ok(())
    }

    /// Stop schedules and tasks, discard in-flight fetches, close the
    /// stream, and wait for everything to finish.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();
        inner.fetcher.invalidate();
        inner.stream.shutdown().await;

        let handles: Vec<_> = inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                debug!(error = %e, "background task ended abnormally");
            }
        }
        inner.store.set_connection_state(ConnectionState::Disconnected);
        info!("sync stopped");
    }

    // ── Operations ───────────────────────────────────────────────────

    pub async fn dispatch(&self, action: Action) -> Result<ActionOutcome, CoreError> {
        self.inner.dispatcher.dispatch(action).await
    }

    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.inner.dispatcher.pending()
    }

    pub async fn refresh(&self, resource: ResourceKind) -> Result<RefreshOutcome, CoreError> {
        self.inner.fetcher.refresh(resource).await
    }

    /// Refresh every configured resource; the first error is returned after
    /// all have been tried.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        let results = join_all(
            self.inner
                .config
                .resources
                .iter()
                .map(|resource| self.inner.fetcher.refresh(*resource)),
        )
        .await;
        results.into_iter().find_map(Result::err).map_or(Ok(()), Err)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.store.subscribe_connection_state()
    }
}

impl<B: Backend> Controller<B, TungsteniteConnector> {
    /// One-shot: load `config.resources`, run `f`, shut down.
    ///
    /// For CLI invocations: the stream is disabled, nothing is polled, and
    /// a failed load is an error rather than a notice.
    pub async fn oneshot<F, Fut, T>(config: SyncConfig, backend: B, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.stream_enabled = false;
        cfg.poll = PollSchedule::empty();

        let controller = Self::new(cfg, backend, TungsteniteConnector);
        let loaded = controller.refresh_all().await;
        let result = match loaded {
            Ok(()) => f(controller.clone()).await,
            Err(e) => Err(e),
        };
        controller.shutdown().await;
        result
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Apply stream events to the store.
async fn event_pump(
    store: Arc<DataStore>,
    mut events: broadcast::Receiver<Arc<StreamEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    store.apply_push(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump fell behind; the next snapshot fills the gap");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Mirror the stream's connection state into the store and report when it
/// gives up.
async fn state_mirror<C: Connector>(
    store: Arc<DataStore>,
    stream: StreamClient<C>,
    notices: broadcast::Sender<Notice>,
    cancel: CancellationToken,
) {
    let mut state = stream.state();
    store.set_connection_state(*state.borrow_and_update());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                store.set_connection_state(current);
                if current == ConnectionState::Disconnected && stream.has_given_up() {
                    let _ = notices.send(Notice::StreamGaveUp {
                        attempts: stream.reconnect_attempt(),
                    });
                }
            }
        }
    }
}
