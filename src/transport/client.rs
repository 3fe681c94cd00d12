//! Realtime transport: connection lifecycle, reconnection and routing.
//!
//! [`RealtimeTransport`] owns one logical duplex connection. It is a cheap,
//! cloneable handle; construct one at the application root and hand clones to
//! consumers.
//!
//! # Lifecycle
//!
//! 1. `connect` - claim the connecting flag, open a link via the [`Connector`]
//! 2. On success - reset backoff, publish `Connected`, spawn the reader task
//! 3. On failure or unexpected close - publish `Error`/`Disconnected` and
//!    schedule one retry per [`ReconnectPolicy`](super::ReconnectPolicy)
//! 4. `disconnect` - close the link, cancel the retry timer, stop retrying
//!
//! # Stale Work
//!
//! Every attempt and every `disconnect` bumps an epoch. Completions, reader
//! exits and retry timers carry the epoch they were started under and are
//! discarded when it no longer matches.
//!
//! Handlers and state listeners are never invoked while the state lock is held.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Envelope;

use super::backoff::ReconnectPolicy;
use super::builder::TransportBuilder;
use super::connection::{Connection, Inbound, Incoming};
use super::connector::Connector;
use super::options::TransportOptions;
use super::registry::{Registry, Subscription};
use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// What started a connection attempt.
#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    /// A caller invoked `connect`.
    Explicit(Option<&'a str>),
    /// A retry timer scheduled under the given epoch fired.
    Retry(u64),
}

/// Mutable connection state guarded by one lock.
struct Shared {
    state: ConnectionState,
    /// Set before the first await of an attempt; cleared when it settles.
    connecting: bool,
    connection: Option<Connection>,
    policy: ReconnectPolicy,
    reconnect_timer: Option<JoinHandle<()>>,
    credential: Option<String>,
    epoch: u64,
    /// Set by `disconnect`, cleared by `connect`.
    stopped: bool,
}

/// State shared by all transport handles and background tasks.
struct Inner {
    endpoint: Url,
    options: TransportOptions,
    connector: Arc<dyn Connector>,
    registry: Arc<Registry>,
    shared: Mutex<Shared>,
}

// ============================================================================
// RealtimeTransport
// ============================================================================

/// Push-message transport with automatic reconnection.
///
/// # Thread Safety
///
/// `RealtimeTransport` is `Send + Sync` and cheap to clone.
#[derive(Clone)]
pub struct RealtimeTransport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("RealtimeTransport")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &shared.state)
            .field("attempts", &shared.policy.attempts())
            .finish()
    }
}

// ============================================================================
// RealtimeTransport - Constructor
// ============================================================================

impl RealtimeTransport {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates a transport in the `Disconnected` state.
    pub(crate) fn new(
        endpoint: Url,
        options: TransportOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let shared = Shared {
            state: ConnectionState::Disconnected,
            connecting: false,
            connection: None,
            policy: options.policy(),
            reconnect_timer: None,
            credential: None,
            epoch: 0,
            stopped: false,
        };

        Self {
            inner: Arc::new(Inner {
                endpoint,
                options,
                connector,
                registry: Registry::new(),
                shared: Mutex::new(shared),
            }),
        }
    }
}

// ============================================================================
// RealtimeTransport - Public API
// ============================================================================

impl RealtimeTransport {
    /// Opens the connection.
    ///
    /// No-op if a connection is open or an attempt is in flight. A
    /// `Some(credential)` replaces the remembered credential; `None` reuses
    /// the last one. Calling `connect` re-arms a reconnect policy that gave up
    /// and cancels any pending retry timer.
    ///
    /// Never fails: errors are published as state changes and retried.
    pub async fn connect(&self, credential: Option<&str>) {
        if let Some(epoch) = self.inner.begin_attempt(Trigger::Explicit(credential)) {
            Arc::clone(&self.inner).attempt(epoch).await;
        }
    }

    /// Closes the connection and stops automatic reconnection.
    ///
    /// Cancels a scheduled retry timer and discards any attempt still in
    /// flight. Resume with [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Sends an envelope if connected.
    ///
    /// Fire-and-forget: returns `false` without error when not connected or
    /// when the payload cannot be serialized. Nothing is queued for later.
    pub fn send<P>(&self, event: &str, payload: &P) -> bool
    where
        P: Serialize + ?Sized,
    {
        self.inner.send(event, payload)
    }

    /// Registers `handler` for envelopes named `event`.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.registry.register(event, Arc::new(handler))
    }

    /// Registers `handler` for connection state transitions.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner.registry.register_state(Arc::new(handler))
    }

    /// Routes one raw inbound frame to its subscribers.
    ///
    /// Malformed frames are logged and dropped. Returns the number of
    /// handlers that ran to completion.
    pub fn dispatch(&self, frame: &str) -> usize {
        self.inner.dispatch(frame)
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Returns `true` if `send` would transmit.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Retries scheduled since the last successful connection.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().policy.attempts()
    }

    /// Base endpoint, without credential.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Active options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }

    /// Subscriber registry backing this transport.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }
}

// ============================================================================
// Inner - Attempts
// ============================================================================

impl Inner {
    /// Claims the connecting flag and returns the attempt epoch.
    ///
    /// Returns `None` if a connection is open, an attempt is in flight, or a
    /// retry timer is stale.
    fn begin_attempt(&self, trigger: Trigger<'_>) -> Option<u64> {
        let mut shared = self.shared.lock();

        match trigger {
            Trigger::Explicit(credential) => {
                if shared.connecting || shared.connection.is_some() {
                    debug!(state = %shared.state, "Connect skipped, already open or in flight");
                    return None;
                }

                if let Some(timer) = shared.reconnect_timer.take() {
                    timer.abort();
                    debug!("Pending reconnect superseded by explicit connect");
                }
                if let Some(credential) = credential {
                    shared.credential = Some(credential.to_owned());
                }
                if shared.policy.is_exhausted() {
                    shared.policy.reset();
                }
                shared.stopped = false;
            }

            Trigger::Retry(epoch) => {
                if shared.epoch != epoch || shared.stopped {
                    trace!(epoch, "Stale reconnect timer");
                    return None;
                }
                shared.reconnect_timer = None;

                if shared.connecting || shared.connection.is_some() {
                    return None;
                }
            }
        }

        shared.connecting = true;
        shared.epoch += 1;
        let epoch = shared.epoch;
        let change = transition(&mut shared, ConnectionState::Connecting);
        drop(shared);

        self.publish(change);
        Some(epoch)
    }

    /// Runs one connection attempt.
    fn attempt(self: Arc<Self>, epoch: u64) -> BoxFuture<'static, ()> {
        async move {
            let url = self.connect_url();
            let limit = self.options.connect_timeout;

            let result = match timeout(limit, self.connector.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(Error::connection_timeout(limit.as_millis() as u64)),
            };

            match result {
                Ok((connection, inbound)) => self.on_open(epoch, connection, inbound),
                Err(e) => self.on_open_failed(epoch, &e),
            }
        }
        .boxed()
    }

    /// Endpoint with the credential appended.
    fn connect_url(&self) -> Url {
        let mut url = self.endpoint.clone();

        if let Some(credential) = self.shared.lock().credential.as_deref() {
            url.query_pairs_mut()
                .append_pair(&self.options.token_param, credential);
        }

        url
    }

    fn on_open(self: &Arc<Self>, epoch: u64, connection: Connection, inbound: Inbound) {
        let mut shared = self.shared.lock();

        if shared.epoch != epoch {
            drop(shared);
            debug!(epoch, "Discarding connection from superseded attempt");
            connection.shutdown();
            return;
        }

        shared.connecting = false;
        shared.connection = Some(connection);
        shared.policy.reset();
        let change = transition(&mut shared, ConnectionState::Connected);
        drop(shared);

        info!(host = self.endpoint.host_str().unwrap_or_default(), "Connected");
        self.publish(change);

        tokio::spawn(Arc::clone(self).read_loop(epoch, inbound));
    }

    fn on_open_failed(self: &Arc<Self>, epoch: u64, error: &Error) {
        let mut shared = self.shared.lock();

        if shared.epoch != epoch {
            trace!(epoch, "Ignoring failure of superseded attempt");
            return;
        }

        warn!(error = %error, attempt = shared.policy.attempts(), "Connection attempt failed");

        shared.connecting = false;
        let change = transition(&mut shared, ConnectionState::Error);
        self.schedule_reconnect(&mut shared);
        drop(shared);

        self.publish(change);
    }

    /// Reader task: routes frames until the link closes.
    async fn read_loop(self: Arc<Self>, epoch: u64, mut inbound: Inbound) {
        let mut fault = None;

        while let Some(incoming) = inbound.recv().await {
            match incoming {
                Incoming::Frame(frame) => {
                    self.dispatch(&frame);
                }
                Incoming::Fault(reason) => fault = Some(reason),
            }
        }

        self.on_closed(epoch, fault);
    }

    fn on_closed(self: &Arc<Self>, epoch: u64, fault: Option<String>) {
        let mut shared = self.shared.lock();

        if shared.epoch != epoch {
            trace!(epoch, "Reader of superseded connection exited");
            return;
        }

        shared.connection = None;
        let next = match &fault {
            Some(reason) => {
                warn!(reason = %reason, "Connection lost");
                ConnectionState::Error
            }
            None => {
                info!("Connection closed by peer");
                ConnectionState::Disconnected
            }
        };
        let change = transition(&mut shared, next);
        self.schedule_reconnect(&mut shared);
        drop(shared);

        self.publish(change);
    }

    /// Schedules one retry, or gives up once the policy is exhausted.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
        if shared.stopped {
            return;
        }

        let Some(delay) = shared.policy.next_delay() else {
            warn!(
                max_attempts = shared.policy.max_attempts(),
                "Reconnect attempts exhausted, giving up"
            );
            return;
        };

        info!(
            attempt = shared.policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let inner = Arc::clone(self);
        let epoch = shared.epoch;
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(next) = inner.begin_attempt(Trigger::Retry(epoch)) {
                inner.attempt(next).await;
            }
        });

        if let Some(previous) = shared.reconnect_timer.replace(timer) {
            previous.abort();
        }
    }
}

// ============================================================================
// Inner - Shutdown, Send, Dispatch
// ============================================================================

impl Inner {
    fn disconnect(&self) {
        let (connection, change) = {
            let mut shared = self.shared.lock();

            shared.stopped = true;
            shared.epoch += 1;
            shared.connecting = false;
            shared.policy.exhaust();

            if let Some(timer) = shared.reconnect_timer.take() {
                timer.abort();
                debug!("Cancelled pending reconnect");
            }

            let connection = shared.connection.take();
            let change = if connection.is_some() {
                transition(&mut shared, ConnectionState::Disconnecting)
            } else {
                None
            };
            (connection, change)
        };

        self.publish(change);

        if let Some(connection) = connection {
            connection.shutdown();
            info!("Disconnected");
        }

        let change = {
            let mut shared = self.shared.lock();
            if shared.stopped {
                transition(&mut shared, ConnectionState::Disconnected)
            } else {
                None
            }
        };
        self.publish(change);
    }

    fn send<P>(&self, event: &str, payload: &P) -> bool
    where
        P: Serialize + ?Sized,
    {
        let connection = {
            let shared = self.shared.lock();
            match (&shared.state, &shared.connection) {
                (ConnectionState::Connected, Some(connection)) => connection.clone(),
                _ => {
                    trace!(event, state = %shared.state, "Send skipped, not connected");
                    return false;
                }
            }
        };

        let frame: Result<String> = serde_json::to_value(payload)
            .map_err(Error::from)
            .and_then(|payload| Envelope::new(event, payload).to_frame());

        match frame.and_then(|frame| connection.send_frame(frame)) {
            Ok(()) => {
                trace!(event, "Envelope queued");
                true
            }
            Err(e) => {
                warn!(event, error = %e, "Dropping outbound envelope");
                false
            }
        }
    }

    fn dispatch(&self, frame: &str) -> usize {
        match Envelope::parse(frame) {
            Ok(envelope) => self.registry.dispatch(&envelope.event, &envelope.payload),
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping malformed frame");
                0
            }
        }
    }

    fn publish(&self, change: Option<ConnectionState>) {
        if let Some(state) = change {
            debug!(%state, "Connection state changed");
            self.registry.notify_state(state);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Sets the state, returning it if it actually changed.
fn transition(shared: &mut Shared, next: ConnectionState) -> Option<ConnectionState> {
    if shared.state == next {
        None
    } else {
        shared.state = next;
        Some(next)
    }
}

// ============================================================================
// Tests
// ============================================================================
