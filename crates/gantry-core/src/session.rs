// ── Session ──
//
// Full lifecycle of one connection to a host daemon: connect, replay
// subscriptions, route inbound frames, and reconnect with backoff until the
// caller disconnects. The ledger and the outbound link live under one lock
// so a topic is sent exactly once per connection, whether it was added
// before or after the link came up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};
use url::Url;
use uuid::Uuid;

use gantry_api::transport::FrameSender;
use gantry_api::{
    Frame, Inbound, Link, Operation, ReconnectConfig, SubscriptionAction, Transport,
    WebSocketTransport,
};

use crate::config::{OperationTimeouts, SessionConfig};
use crate::correlation::CorrelationRegistry;
use crate::dispatch::{Dispatcher, ListenerHandle};
use crate::error::CoreError;
use crate::ledger::SubscriptionLedger;
use crate::model::{EntityId, EventKind, PushEvent, Topic, TopicKind};

const CONNECTIVITY_CHANNEL_SIZE: usize = 64;

/// How long a closing link may take to flush before it is abandoned.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connectivity notifications, broadcast to every interested consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The observable state moved.
    StateChanged(ConnectionState),
    /// The daemon refused the credential. The session keeps retrying.
    AuthRejected { reason: String },
    /// A connection attempt failed for any other reason. `attempt` counts
    /// consecutive failures, starting at 1.
    ConnectFailed { attempt: u32, reason: String },
}

// ── Session ──────────────────────────────────────────────────────

/// Connection to a single host daemon.
///
/// Cheaply cloneable via `Arc<SessionInner>`; clones share one connection,
/// one subscription ledger, and one set of listeners. The background loop
/// holds a reference too, so call [`disconnect()`](Self::disconnect) to
/// release it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct Channel {
    ledger: SubscriptionLedger,
    link: Option<FrameSender>,
}

struct SessionInner {
    id: Uuid,
    daemon_url: Url,
    reconnect: ReconnectConfig,
    timeouts: OperationTimeouts,
    transport: Arc<dyn Transport>,
    credential: Mutex<Option<SecretString>>,
    state: watch::Sender<ConnectionState>,
    connectivity: broadcast::Sender<ConnectivityEvent>,
    channel: Mutex<Channel>,
    registry: CorrelationRegistry,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Shared state stays consistent between statements, so a panic on
/// another thread never leaves it half-written.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a session over an arbitrary transport. Does NOT connect --
    /// call [`connect()`](Self::connect) to start the background loop.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let SessionConfig {
            daemon_url,
            credential,
            reconnect,
            timeouts,
        } = config;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (connectivity, _) = broadcast::channel(CONNECTIVITY_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                daemon_url,
                reconnect,
                timeouts,
                transport,
                credential: Mutex::new(Some(credential)),
                state,
                connectivity,
                channel: Mutex::new(Channel {
                    ledger: SubscriptionLedger::new(),
                    link: None,
                }),
                registry: CorrelationRegistry::new(),
                dispatcher: Dispatcher::new(),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a session that reaches the daemon over WebSocket.
    pub fn websocket(config: SessionConfig) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.daemon_url.clone()));
        Self::new(config, transport)
    }

    /// Identifier used in log output.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn daemon_url(&self) -> &Url {
        &self.inner.daemon_url
    }

    pub fn timeouts(&self) -> &OperationTimeouts {
        &self.inner.timeouts
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start the connection loop.
    ///
    /// Returns immediately; observe [`connection_state()`](Self::connection_state)
    /// or await [`wait_until_connected()`](Self::wait_until_connected).
    /// Calling it while the loop is running is a no-op. Fails with
    /// [`CoreError::SessionClosed`] once the session has been disconnected.
    pub fn connect(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }

        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(session = %self.inner.id, "connect ignored: loop already running");
            return Ok(());
        }

        let credential = lock(&self.inner.credential)
            .clone()
            .ok_or(CoreError::SessionClosed)?;

        let span = tracing::info_span!("session", session = %self.inner.id);
        *task = Some(tokio::spawn(
            run_session(Arc::clone(&self.inner), credential).instrument(span),
        ));
        Ok(())
    }

    /// Shut the session down for good.
    ///
    /// Cancels the loop, closes the connection, clears the subscription
    /// ledger, and discards the credential. Requests still in flight are
    /// left to their own timeouts. Safe to call more than once.
    pub async fn disconnect(&self) {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        lock(&self.inner.credential).take();
        self.inner.cancel.cancel();

        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(session = %self.inner.id, error = %e, "session loop ended abnormally");
            }
        }

        {
            let mut channel = lock(&self.inner.channel);
            channel.ledger.clear();
            channel.link = None;
        }
        self.inner.set_state(ConnectionState::Disconnected);

        if first {
            info!(session = %self.inner.id, "session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to connectivity notifications.
    pub fn connectivity(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.connectivity.subscribe()
    }

    /// Wait until the session is connected.
    ///
    /// Fails early with [`CoreError::AuthenticationFailed`] when the daemon
    /// rejects the credential (the loop itself keeps retrying), and with
    /// [`CoreError::ConnectionFailed`] carrying the last failure once
    /// `timeout` elapses.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut last_failure = None;
        match tokio::time::timeout(timeout, self.await_connected(&mut last_failure)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::ConnectionFailed {
                reason: last_failure.unwrap_or_else(|| {
                    format!("not connected within {}ms", timeout.as_millis())
                }),
            }),
        }
    }

    async fn await_connected(&self, last_failure: &mut Option<String>) -> Result<(), CoreError> {
        let mut state = self.inner.state.subscribe();
        let mut events = self.inner.connectivity.subscribe();

        loop {
            if *state.borrow_and_update() == ConnectionState::Connected {
                return Ok(());
            }
            if self.is_closed() {
                return Err(CoreError::SessionClosed);
            }

            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(CoreError::SessionClosed);
                    }
                }
                event = events.recv() => match event {
                    Ok(ConnectivityEvent::AuthRejected { reason }) => {
                        return Err(CoreError::AuthenticationFailed { message: reason });
                    }
                    Ok(ConnectivityEvent::ConnectFailed { reason, .. }) => {
                        *last_failure = Some(reason);
                    }
                    Ok(ConnectivityEvent::StateChanged(_))
                    | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CoreError::SessionClosed);
                    }
                },
            }
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Ask for push events about `entity`.
    ///
    /// Recorded in the ledger whether or not the session is connected and
    /// replayed after every reconnect. Returns `false` if the topic was
    /// already subscribed, in which case nothing is sent.
    pub fn subscribe(&self, kind: TopicKind, entity: impl Into<EntityId>) -> bool {
        self.update_subscription(Topic::new(kind, entity), SubscriptionAction::Subscribe)
    }

    /// Stop push events about `entity`. Returns `false` if the topic was
    /// not subscribed, in which case nothing is sent.
    pub fn unsubscribe(&self, kind: TopicKind, entity: impl Into<EntityId>) -> bool {
        self.update_subscription(Topic::new(kind, entity), SubscriptionAction::Unsubscribe)
    }

    fn update_subscription(&self, topic: Topic, action: SubscriptionAction) -> bool {
        let mut channel = lock(&self.inner.channel);
        let changed = match action {
            SubscriptionAction::Subscribe => channel.ledger.insert(topic.clone()),
            SubscriptionAction::Unsubscribe => channel.ledger.remove(&topic),
        };
        if !changed {
            return false;
        }

        match &channel.link {
            Some(link) => {
                if link.send(Frame::subscription(&topic, action)).is_err() {
                    debug!(%topic, "link closed before {action} was sent");
                }
                debug!(session = %self.inner.id, %topic, %action, "subscription sent");
            }
            None => debug!(session = %self.inner.id, %topic, %action, "subscription recorded offline"),
        }
        true
    }

    /// Topics currently subscribed, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        lock(&self.inner.channel).ledger.snapshot()
    }

    // ── Push events ──────────────────────────────────────────────

    /// Receive every push event of `kind`.
    ///
    /// Callbacks run on the session task in transport order and must not
    /// block; spawn for anything that awaits.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, callback)
    }

    /// Receive push events of `kind` about `entity` only.
    pub fn on_entity<F>(&self, kind: EventKind, entity: impl Into<EntityId>, callback: F) -> ListenerHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_entity(kind, entity, callback)
    }

    // ── Request plumbing (used by operations.rs) ─────────────────

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.pending_count()
    }

    /// The installed link, if connected.
    pub(crate) fn outbound(&self) -> Result<FrameSender, CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        lock(&self.inner.channel)
            .link
            .clone()
            .ok_or(CoreError::NotConnected)
    }

    /// Send a tagged request and await its reply payload.
    pub(crate) async fn call(
        &self,
        operation: Operation,
        payload: Map<String, Value>,
    ) -> Result<Value, CoreError> {
        let outbound = self.outbound()?;
        let timeout = self.inner.timeouts.for_operation(operation);
        self.inner
            .registry
            .issue(&outbound, operation, payload, timeout)
            .await
    }

    /// Send a fire-and-forget message.
    pub(crate) fn cast(&self, operation: Operation, payload: Map<String, Value>) -> Result<(), CoreError> {
        self.outbound()?
            .send(Frame::command(operation, payload))
            .map_err(|_| CoreError::NotConnected)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("daemon_url", &self.inner.daemon_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Session internals ────────────────────────────────────────────

impl SessionInner {
    /// Publish a state transition. Repeats are swallowed so observers only
    /// see real changes.
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(session = %self.id, state = %next, "connection state changed");
            self.emit(ConnectivityEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ConnectivityEvent) {
        // No receivers is fine.
        let _ = self.connectivity.send(event);
    }

    /// Install the link, replay the ledger, and go `Connected` in one step.
    fn attach(&self, outbound: FrameSender) {
        let mut channel = lock(&self.channel);
        let mut replayed = 0usize;
        for topic in channel.ledger.iter() {
            if outbound
                .send(Frame::subscription(topic, SubscriptionAction::Subscribe))
                .is_err()
            {
                break;
            }
            replayed += 1;
        }
        channel.link = Some(outbound);
        self.set_state(ConnectionState::Connected);
        debug!(session = %self.id, topics = replayed, "subscriptions replayed");
    }

    fn detach(&self) {
        let mut channel = lock(&self.channel);
        channel.link = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Read inbound frames until the link drops or the session is cancelled.
    async fn serve(&self, link: Link) {
        let Link {
            outbound,
            mut inbound,
            driver,
        } = link;
        self.attach(outbound);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.route(frame),
                    None => break,
                },
            }
        }

        self.detach();

        // Let the transport flush queued frames and close cleanly.
        if let Some(driver) = driver {
            if tokio::time::timeout(CLOSE_GRACE, driver).await.is_err() {
                debug!(session = %self.id, "transport did not close within grace period");
            }
        }
    }

    fn route(&self, frame: Frame) {
        match Inbound::classify(frame) {
            Ok(Inbound::Reply {
                correlation_id,
                channel,
                payload,
            }) => {
                if let Err(e) = self.registry.resolve(&correlation_id, &channel, payload) {
                    warn!(session = %self.id, error = %e, "dropping reply");
                }
            }
            Ok(Inbound::Failure {
                correlation_id,
                message,
            }) => {
                self.registry.reject(&correlation_id, message);
            }
            Ok(Inbound::Push {
                kind,
                entity_id,
                payload,
            }) => {
                let event = PushEvent {
                    kind,
                    entity_id,
                    payload,
                };
                let delivered = self.dispatcher.dispatch(&event);
                trace!(session = %self.id, %kind, entity = %event.entity_id, delivered, "push event");
            }
            Err(e) => warn!(session = %self.id, error = %e, "dropping malformed frame"),
        }
    }
}

/// Connect, serve, back off, repeat until cancelled.
async fn run_session(inner: Arc<SessionInner>, credential: SecretString) {
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = inner.transport.open(&credential) => result,
        };

        match opened {
            Ok(link) => {
                info!(url = %inner.daemon_url, "connected to daemon");
                attempt = 0;
                inner.serve(link).await;
                if inner.cancel.is_cancelled() {
                    break;
                }
                warn!("connection to daemon lost");
            }
            Err(e) => {
                let reason = e.to_string();
                let failures = attempt.saturating_add(1);
                if e.is_auth_rejected() {
                    warn!(attempt = failures, error = %reason, "daemon rejected credential");
                    inner.emit(ConnectivityEvent::AuthRejected { reason });
                } else {
                    warn!(attempt = failures, error = %reason, "connection attempt failed");
                    inner.emit(ConnectivityEvent::ConnectFailed {
                        attempt: failures,
                        reason,
                    });
                }
                inner.set_state(ConnectionState::Disconnected);
            }
        }

        let delay = inner.reconnect.delay_for(attempt, inner.id.as_u64_pair().0);
        debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting after backoff"
        );
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
    }

    inner.detach();
    debug!("session loop exiting");
}

// ── Tests ────────────────────────────────────────────────────────────
