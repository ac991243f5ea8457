//! Resilient client connection to a log relay
//!
//! [`ConnectionManager`] keeps one logical session open on a [`HubTransport`].
//! Once [`ConnectionManager::start`] has been called the manager wants to be
//! connected: every failed attempt is retried after a fixed delay and every
//! session the transport loses is reopened, until [`ConnectionManager::stop`].
//!
//! ## State machine
//!
//! ```text
//!                 attempt                  open ok
//! Disconnected ───────────► Connecting ───────────► Connected
//!      ▲                         │                      │
//!      │   open failed (retry)   │                      │ peer close (reopen)
//!      └─────────────────────────┘◄─────────────────────┘ stop (no reopen)
//! ```
//!
//! All transitions happen under one async lock. Only one reconnect loop runs
//! at a time; overlapping entries return [`RetryOutcome::InFlight`].
//!
//! Sends and group operations never take the lock. They go straight to the
//! transport and fail fast when no session is open.
//!
//! Lifecycle handlers run on their own tasks after the transition that fired
//! them. Their errors and panics are discarded and they may observe a later
//! state than the one that fired them.

use crate::ConnectionError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use loghub_codec::HubFrame;
use loghub_network::{HubTransport, TransportError, TransportEvent, TransportEventReceiver};
use loghub_types::{normalize_group_name, Level, LogMessage};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Pause between two failed connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Error type lifecycle handlers may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type PushHandler = dyn Fn(&[LogMessage]) + Send + Sync;
type ConnectedHandler = dyn Fn() -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;
type ClosedHandler =
    dyn Fn(Option<TransportError>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot published after every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Whether the manager has been started and not stopped since
    pub running: bool,
}

/// How long [`ConnectionManager::start`] waits for the first session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTimeout {
    Infinite,
    After(Duration),
}

impl From<Duration> for StartTimeout {
    fn from(timeout: Duration) -> Self {
        StartTimeout::After(timeout)
    }
}

impl From<Option<Duration>> for StartTimeout {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(StartTimeout::Infinite, StartTimeout::After)
    }
}

/// How a pass of the reconnect loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A session is open, either opened by this pass or found open
    Connected,
    /// Another loop was already running; this call did nothing
    InFlight,
    /// The manager is not running
    Stopped,
    /// The cancellation token fired
    Cancelled,
}

/// Instrumentation hook for connection lifecycle
///
/// Failed attempts are otherwise silent. Attach [`TracingObserver`] or a
/// custom implementation to see them.
pub trait ConnectionObserver: Send + Sync {
    fn connect_failed(&self, _endpoint: &str, _attempt: u64, _error: &TransportError) {}

    fn connected(&self, _endpoint: &str) {}

    fn closed(&self, _endpoint: &str, _error: Option<&TransportError>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConnectionObserver for NoopObserver {}

/// Reports lifecycle through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn connect_failed(&self, endpoint: &str, attempt: u64, error: &TransportError) {
        warn!(endpoint, attempt, error = %error, "Relay connection attempt failed");
    }

    fn connected(&self, endpoint: &str) {
        info!(endpoint, "Connected to relay");
    }

    fn closed(&self, endpoint: &str, error: Option<&TransportError>) {
        match error {
            Some(error) => warn!(endpoint, error = %error, "Relay connection lost"),
            None => info!(endpoint, "Relay connection closed"),
        }
    }
}

#[derive(Clone)]
pub struct ConnectionOptions {
    pub retry_delay: Duration,
    pub observer: Arc<dyn ConnectionObserver>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            observer: Arc::new(NoopObserver),
        }
    }
}

impl ConnectionOptions {
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_observer<O: ConnectionObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// Registration of a handler; dropping it unregisters the handler
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(unregister: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Keep the handler registered for as long as the manager lives
    pub fn forget(mut self) {
        self.unregister = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

struct HandlerSet<H: ?Sized> {
    next_id: AtomicU64,
    entries: parking_lot::Mutex<Vec<(u64, Arc<H>)>>,
}

impl<H: ?Sized + Send + Sync + 'static> HandlerSet<H> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            entries: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn subscribe(self: &Arc<Self>, handler: Arc<H>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, handler));

        let set = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(set) = set.upgrade() {
                set.entries.lock().retain(|(entry, _)| *entry != id);
            }
        })
    }

    fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries.lock().iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}

/// Claim on the reconnect loop, released on drop
struct SingleFlight<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl<'a> SingleFlight<'a> {
    fn try_enter(flag: &'a AtomicBool, done: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, done })
    }
}

impl Drop for SingleFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

struct Core {
    state: ConnectionState,
    running: bool,
    /// Bumped for every opened or stopped session; close events carry it
    generation: u64,
}

struct Inner {
    transport: Arc<dyn HubTransport>,
    endpoint: String,
    retry_delay: Duration,
    observer: Arc<dyn ConnectionObserver>,

    core: Mutex<Core>,
    status: watch::Sender<ConnectionStatus>,

    reconnecting: AtomicBool,
    flight_done: Notify,
    attempts: AtomicU64,

    /// Cancelled when the last manager handle is dropped
    root: CancellationToken,
    /// Cancelled by `stop`, renewed by the next `start`
    run_token: parking_lot::Mutex<CancellationToken>,

    push_handlers: Arc<HandlerSet<PushHandler>>,
    connected_handlers: Arc<HandlerSet<ConnectedHandler>>,
    closed_handlers: Arc<HandlerSet<ClosedHandler>>,
}

impl Inner {
    fn publish(&self, core: &Core) {
        self.status.send_replace(ConnectionStatus {
            state: core.state,
            running: core.running,
        });
    }

    fn transition(&self, core: &mut Core, next: ConnectionState) {
        if core.state != next {
            debug!(
                endpoint = %self.endpoint,
                from = ?core.state,
                to = ?next,
                "Connection state transition"
            );
            core.state = next;
        }
        self.publish(core);
    }

    fn run_token(&self) -> CancellationToken {
        self.run_token.lock().clone()
    }

    fn renew_run_token(&self) -> CancellationToken {
        let mut token = self.run_token.lock();
        if token.is_cancelled() && !self.root.is_cancelled() {
            *token = self.root.child_token();
        }
        token.clone()
    }

    fn is_running(&self) -> bool {
        self.status.borrow().running
    }

    /// One pass of the reconnect loop
    async fn reconnect(self: Arc<Self>, cancel: CancellationToken) -> RetryOutcome {
        let Some(_flight) = SingleFlight::try_enter(&self.reconnecting, &self.flight_done) else {
            return RetryOutcome::InFlight;
        };

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }

            let mut core = tokio::select! {
                _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                core = self.core.lock() => core,
            };
            if !core.running {
                return RetryOutcome::Stopped;
            }
            if core.state == ConnectionState::Connected {
                return RetryOutcome::Connected;
            }

            self.transition(&mut core, ConnectionState::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let opened = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.transport.open(events_tx) => Some(result),
            };

            match opened {
                None => {
                    self.transition(&mut core, ConnectionState::Disconnected);
                    return RetryOutcome::Cancelled;
                }
                Some(Ok(())) => {
                    core.generation += 1;
                    let generation = core.generation;
                    self.transition(&mut core, ConnectionState::Connected);
                    drop(core);

                    self.spawn_receiver(generation, events_rx);
                    self.observer.connected(&self.endpoint);
                    self.fire_connected();
                    return RetryOutcome::Connected;
                }
                Some(Err(error)) => {
                    self.transition(&mut core, ConnectionState::Disconnected);
                    drop(core);
                    self.observer
                        .connect_failed(&self.endpoint, attempt, &error);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    /// Run the reconnect loop, or wait on the one already in flight
    async fn connect_or_wait(self: &Arc<Self>, cancel: CancellationToken) -> bool {
        loop {
            match Arc::clone(self).reconnect(cancel.clone()).await {
                RetryOutcome::Connected => return true,
                RetryOutcome::Stopped | RetryOutcome::Cancelled => return false,
                RetryOutcome::InFlight => {
                    if self.wait_for_flight(&cancel).await {
                        return true;
                    }
                    if cancel.is_cancelled() {
                        return false;
                    }
                }
            }
        }
    }

    /// Wait until connected (`true`) or the running loop gives up (`false`)
    async fn wait_for_flight(&self, cancel: &CancellationToken) -> bool {
        let mut status = self.status.subscribe();
        loop {
            let done = self.flight_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();

            let current = *status.borrow_and_update();
            if current.state == ConnectionState::Connected {
                return true;
            }
            if !current.running || !self.reconnecting.load(Ordering::Acquire) {
                return false;
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut done => return false,
                changed = status.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Start a reconnect loop after the retry delay
    fn schedule_retry(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let token = inner.run_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.retry_delay) => {}
            }
            inner.reconnect(token).await;
        });
    }

    fn spawn_receiver(self: &Arc<Self>, generation: u64, mut events: TransportEventReceiver) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match event {
                    TransportEvent::Frame(HubFrame::WriteLogEvents { messages }) => {
                        for handler in inner.push_handlers.snapshot() {
                            handler(&messages);
                        }
                    }
                    TransportEvent::Frame(frame) => {
                        debug!(
                            endpoint = %inner.endpoint,
                            method = %frame.method(),
                            "Ignoring frame not addressed to clients"
                        );
                    }
                    TransportEvent::Closed(error) => {
                        inner.session_closed(generation, error).await;
                        return;
                    }
                }
            }
        });
    }

    async fn session_closed(self: &Arc<Self>, generation: u64, error: Option<TransportError>) {
        let running = {
            let mut core = self.core.lock().await;
            if core.generation != generation || core.state != ConnectionState::Connected {
                debug!(endpoint = %self.endpoint, generation, "Ignoring close of a stale session");
                return;
            }
            self.transition(&mut core, ConnectionState::Disconnected);
            core.running
        };

        self.observer.closed(&self.endpoint, error.as_ref());
        self.fire_closed(error);

        if running {
            let inner = Arc::clone(self);
            let token = inner.run_token();
            tokio::spawn(async move {
                inner.reconnect(token).await;
            });
        }
    }

    fn fire_connected(&self) {
        for handler in self.connected_handlers.snapshot() {
            let endpoint = self.endpoint.clone();
            tokio::spawn(async move {
                if let Err(error) = handler().await {
                    debug!(%endpoint, %error, "Connected handler failed");
                }
            });
        }
    }

    fn fire_closed(&self, error: Option<TransportError>) {
        for handler in self.closed_handlers.snapshot() {
            let endpoint = self.endpoint.clone();
            let error = error.clone();
            tokio::spawn(async move {
                if let Err(error) = handler(error).await {
                    debug!(%endpoint, %error, "Closed handler failed");
                }
            });
        }
    }
}

/// One logical connection to a relay
///
/// Cheap to clone; all clones drive the same session. Background retries end
/// when the last clone is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    _owner: Arc<DropGuard>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        Self::with_options(transport, ConnectionOptions::default())
    }

    pub fn with_options(transport: Arc<dyn HubTransport>, options: ConnectionOptions) -> Self {
        let root = CancellationToken::new();
        let run_token = root.child_token();
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Disconnected,
            running: false,
        });

        let inner = Arc::new(Inner {
            endpoint: transport.endpoint(),
            transport,
            retry_delay: options.retry_delay,
            observer: options.observer,
            core: Mutex::new(Core {
                state: ConnectionState::Disconnected,
                running: false,
                generation: 0,
            }),
            status,
            reconnecting: AtomicBool::new(false),
            flight_done: Notify::new(),
            attempts: AtomicU64::new(0),
            root: root.clone(),
            run_token: parking_lot::Mutex::new(run_token),
            push_handlers: HandlerSet::new(),
            connected_handlers: HandlerSet::new(),
            closed_handlers: HandlerSet::new(),
        });

        Self {
            inner,
            _owner: Arc::new(root.drop_guard()),
        }
    }

    /// Bring the connection up within `timeout`
    ///
    /// Returns `true` once connected, or immediately when already connected.
    /// Returns `false` on timeout, cancellation or a concurrent stop. The
    /// manager stays started either way, and after a failed start a
    /// background loop keeps trying, the first time after the retry delay.
    /// A zero timeout only marks the manager started and schedules that
    /// background loop.
    pub async fn start(&self, timeout: impl Into<StartTimeout>, cancel: &CancellationToken) -> bool {
        let inner = &self.inner;
        let run_token = inner.renew_run_token();

        {
            let mut core = tokio::select! {
                _ = cancel.cancelled() => return false,
                core = inner.core.lock() => core,
            };
            core.running = true;
            inner.publish(&core);
            if core.state == ConnectionState::Connected {
                return true;
            }
        }

        let timeout = timeout.into();
        if matches!(timeout, StartTimeout::After(d) if d.is_zero()) {
            inner.schedule_retry();
            return false;
        }

        let attempt = run_token.child_token();
        let connecting = inner.connect_or_wait(attempt.clone());
        tokio::pin!(connecting);

        let deadline = async move {
            match timeout {
                StartTimeout::Infinite => std::future::pending::<()>().await,
                StartTimeout::After(timeout) => tokio::time::sleep(timeout).await,
            }
        };

        let finished = tokio::select! {
            connected = &mut connecting => Some(connected),
            _ = cancel.cancelled() => None,
            _ = deadline => None,
        };

        let connected = match finished {
            Some(connected) => connected,
            None => {
                attempt.cancel();
                connecting.await
            }
        };

        if !connected && inner.is_running() {
            debug!(endpoint = %inner.endpoint, "Start did not connect; retrying in background");
            inner.schedule_retry();
        }
        connected
    }

    /// Start without waiting for the connection
    ///
    /// The first attempt begins right away on a background task; failures
    /// are retried as usual. The manager reports running once that task has
    /// taken the connection lock.
    pub fn start_in_background(&self) {
        let inner = Arc::clone(&self.inner);
        let token = inner.renew_run_token();
        tokio::spawn(async move {
            {
                let mut core = tokio::select! {
                    _ = token.cancelled() => return,
                    core = inner.core.lock() => core,
                };
                core.running = true;
                inner.publish(&core);
            }
            inner.reconnect(token).await;
        });
    }

    /// Close the session and stop reconnecting
    ///
    /// Idempotent. The manager can be started again afterwards.
    pub async fn stop(&self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        let inner = &self.inner;
        inner.run_token.lock().cancel();

        let mut core = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            core = inner.core.lock() => core,
        };
        core.running = false;
        let was_connected = core.state == ConnectionState::Connected;
        let closed = inner.transport.close().await;
        core.generation += 1;
        inner.transition(&mut core, ConnectionState::Disconnected);
        drop(core);

        if was_connected {
            info!(endpoint = %inner.endpoint, "Relay connection stopped");
            inner.observer.closed(&inner.endpoint, None);
            inner.fire_closed(None);
        }
        closed.map_err(ConnectionError::from)
    }

    /// Run the reconnect loop once, unless one is already running
    pub async fn try_connect(&self) -> RetryOutcome {
        let token = self.inner.run_token();
        Arc::clone(&self.inner).reconnect(token).await
    }

    pub async fn send(&self, group: &str, messages: Vec<LogMessage>) -> Result<(), ConnectionError> {
        self.invoke(HubFrame::SendLogEvents {
            group: normalize_group_name(group).to_string(),
            messages,
        })
        .await
    }

    /// Like [`ConnectionManager::send`] but the relay skips this session
    pub async fn send_to_others(
        &self,
        group: &str,
        messages: Vec<LogMessage>,
    ) -> Result<(), ConnectionError> {
        self.invoke(HubFrame::SendLogEventsToOthers {
            group: normalize_group_name(group).to_string(),
            messages,
        })
        .await
    }

    pub async fn send_one(
        &self,
        group: &str,
        level: Level,
        text: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        self.send(group, vec![LogMessage::with_level(level, text)])
            .await
    }

    pub async fn send_one_to_others(
        &self,
        group: &str,
        level: Level,
        text: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        self.send_to_others(group, vec![LogMessage::with_level(level, text)])
            .await
    }

    pub async fn join_group(&self, group: &str) -> Result<(), ConnectionError> {
        self.invoke(HubFrame::JoinGroup {
            group: normalize_group_name(group).to_string(),
        })
        .await
    }

    pub async fn leave_group(&self, group: &str) -> Result<(), ConnectionError> {
        self.invoke(HubFrame::LeaveGroup {
            group: normalize_group_name(group).to_string(),
        })
        .await
    }

    async fn invoke(&self, frame: HubFrame) -> Result<(), ConnectionError> {
        self.inner
            .transport
            .send(frame)
            .await
            .map_err(ConnectionError::from)
    }

    /// Handle every batch the relay pushes to this client
    ///
    /// Runs on the session's receive task and should return quickly.
    pub fn on_message_push<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[LogMessage]) + Send + Sync + 'static,
    {
        let handler: Arc<PushHandler> = Arc::new(handler);
        self.inner.push_handlers.subscribe(handler)
    }

    /// Run after every successful connection, including reconnections
    pub fn on_connected<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Arc<ConnectedHandler> = Arc::new(move || handler().boxed());
        self.inner.connected_handlers.subscribe(handler)
    }

    /// Run whenever a session ends, with the error that ended it if any
    pub fn on_closed<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(Option<TransportError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Arc<ClosedHandler> = Arc::new(move |error| handler(error).boxed());
        self.inner.closed_handlers.subscribe(handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn retry_delay(&self) -> Duration {
        self.inner.retry_delay
    }

    /// Transport open attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ObservedEvent, RecordingObserver, ScriptedTransport};
    use std::sync::atomic::AtomicUsize;

    const RETRY: Duration = Duration::from_secs(5);

    fn manager(transport: &Arc<ScriptedTransport>) -> ConnectionManager {
        let transport: Arc<dyn HubTransport> = transport.clone();
        ConnectionManager::with_options(
            transport,
            ConnectionOptions::default().with_retry_delay(RETRY),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_when_connected_does_not_reconnect() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.start(Duration::from_secs(1), &cancel).await);
        assert!(manager.start(StartTimeout::Infinite, &cancel).await);

        assert_eq!(transport.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_share_one_attempt() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(200)));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        let (a, b, c) = tokio::join!(
            manager.start(StartTimeout::Infinite, &cancel),
            manager.start(StartTimeout::Infinite, &cancel),
            manager.start(Duration::from_secs(2), &cancel),
        );

        assert!(a && b && c);
        assert_eq!(transport.open_attempts(), 1);
        assert_eq!(transport.max_concurrent_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_entry_point_is_single_flight() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(200)));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        // Marks the manager running without connecting
        assert!(!manager.start(Duration::ZERO, &cancel).await);
        assert_eq!(transport.open_attempts(), 0);

        let outcomes = tokio::join!(
            manager.try_connect(),
            manager.try_connect(),
            manager.try_connect(),
            manager.try_connect(),
        );
        let outcomes = [outcomes.0, outcomes.1, outcomes.2, outcomes.3];

        let connected = outcomes
            .iter()
            .filter(|o| **o == RetryOutcome::Connected)
            .count();
        let in_flight = outcomes
            .iter()
            .filter(|o| **o == RetryOutcome::InFlight)
            .count();
        assert_eq!(connected, 1);
        assert_eq!(in_flight, 3);
        assert_eq!(transport.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retried_after_delay() {
        let transport = Arc::new(ScriptedTransport::failing(3));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(transport.open_attempts(), 4);
        assert_eq!(manager.connect_attempts(), 4);

        let times = transport.attempt_times();
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= RETRY, "gap {:?} shorter than retry delay", gap);
            assert!(gap < RETRY + Duration::from_millis(100), "gap {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_start_times_out_to_disconnected() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_secs(10)));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(!manager.start(Duration::from_secs(1), &cancel).await);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.is_running());
        assert_eq!(transport.open_attempts(), 1);
        assert_eq!(transport.successful_opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_retry_after_failed_start() {
        let transport = Arc::new(ScriptedTransport::failing(1));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(!manager.start(Duration::from_secs(1), &cancel).await);
        assert_eq!(transport.open_attempts(), 1);

        let mut status = manager.watch_state();
        status
            .wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap();
        assert_eq!(transport.open_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_does_not_connect_inline() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(!manager.start(Duration::ZERO, &cancel).await);
        assert!(manager.is_running());
        assert_eq!(transport.open_attempts(), 0);

        tokio::time::sleep(RETRY + Duration::from_millis(50)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_start_connects_and_stops_with_last_handle() {
        let transport = Arc::new(ScriptedTransport::failing(2));
        let manager = manager(&transport);

        manager.start_in_background();
        let mut status = manager.watch_state();
        status
            .wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap();
        assert_eq!(transport.open_attempts(), 3);

        assert!(transport.drop_session(None));
        transport.fail_next_opens(usize::MAX);
        settle().await;
        let attempts = transport.open_attempts();

        drop(status);
        drop(manager);
        tokio::time::sleep(RETRY * 4).await;
        assert_eq!(transport.open_attempts(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_start_returns_false() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_secs(3)));
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        assert!(!manager.start(StartTimeout::Infinite, &cancel).await);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnect_after_stop() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        manager.stop(&cancel).await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_running());

        // The stopped session reports a late failure
        assert!(transport.close_previous_session(Some(TransportError::ClosedByPeer {
            reason: None
        })));
        tokio::time::sleep(RETRY * 3).await;

        assert_eq!(transport.open_attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Stop is idempotent
        manager.stop(&cancel).await.unwrap();
        assert_eq!(transport.close_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_attempt_and_close() {
        let transport = Arc::new(ScriptedTransport::failing(3));
        let observer = Arc::new(RecordingObserver::new());
        let dyn_transport: Arc<dyn HubTransport> = transport.clone();
        let mut options = ConnectionOptions::default().with_retry_delay(RETRY);
        options.observer = observer.clone();
        let manager = ConnectionManager::with_options(dyn_transport, options);
        let cancel = CancellationToken::new();

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        assert_eq!(observer.failed_attempts(), vec![1, 2, 3]);
        assert_eq!(observer.count(&ObservedEvent::Connected), 1);

        assert!(transport.drop_session(Some(TransportError::ServerTimeout { timeout_ms: 30_000 })));
        settle().await;
        assert_eq!(observer.count(&ObservedEvent::Closed { error: true }), 1);
        assert_eq!(observer.count(&ObservedEvent::Connected), 2);

        manager.stop(&cancel).await.unwrap();
        assert_eq!(
            observer.events(),
            vec![
                ObservedEvent::ConnectFailed { attempt: 1 },
                ObservedEvent::ConnectFailed { attempt: 2 },
                ObservedEvent::ConnectFailed { attempt: 3 },
                ObservedEvent::Connected,
                ObservedEvent::Closed { error: true },
                ObservedEvent::Connected,
                ObservedEvent::Closed { error: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_with_observer_wraps_a_concrete_observer() {
        let transport = Arc::new(ScriptedTransport::failing(1));
        let dyn_transport: Arc<dyn HubTransport> = transport.clone();
        let manager = ConnectionManager::with_options(
            dyn_transport,
            ConnectionOptions::default()
                .with_retry_delay(Duration::from_millis(1))
                .with_observer(TracingObserver),
        );

        assert!(manager.start(StartTimeout::Infinite, &CancellationToken::new()).await);
        assert_eq!(transport.open_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_reconnects_and_fires_events() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        let connected = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let _on_connected = {
            let connected = connected.clone();
            manager.on_connected(move || {
                let connected = connected.clone();
                async move {
                    connected.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            })
        };
        let _on_closed = {
            let closed = closed.clone();
            manager.on_closed(move |error| {
                let closed = closed.clone();
                async move {
                    assert!(error.is_some());
                    closed.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            })
        };

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        settle().await;
        assert_eq!(connected.load(Ordering::SeqCst), 1);

        assert!(transport.drop_session(Some(TransportError::ServerTimeout { timeout_ms: 30_000 })));
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(transport.open_attempts(), 2);
        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handlers_are_contained() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        let calls = Arc::new(AtomicUsize::new(0));
        let _failing = manager.on_connected(|| async { Err::<(), HandlerError>("boom".into()) });
        let _panicking = manager.on_connected(|| async {
            if true {
                panic!("handler panic");
            }
            Ok::<(), HandlerError>(())
        });
        let _counting = {
            let calls = calls.clone();
            manager.on_connected(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            })
        };

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_handlers_and_unsubscribe() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let subscription = {
            let received = received.clone();
            manager.on_message_push(move |messages| {
                received.lock().extend_from_slice(messages);
            })
        };

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        assert!(transport.push(vec![LogMessage::new(2, "first")]));
        settle().await;
        assert_eq!(received.lock().len(), 1);

        drop(subscription);
        assert!(transport.push(vec![LogMessage::new(2, "second")]));
        settle().await;
        assert_eq!(received.lock().len(), 1);
        assert_eq!(received.lock()[0].message(), "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_normalize_group_names() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = manager(&transport);
        let cancel = CancellationToken::new();

        assert!(matches!(
            manager.join_group("ops").await,
            Err(ConnectionError::Transport(TransportError::NotConnected))
        ));

        assert!(manager.start(StartTimeout::Infinite, &cancel).await);
        manager.join_group("  ").await.unwrap();
        manager.send_one("", Level::Warning, "disk").await.unwrap();
        manager
            .send_to_others("ops", vec![LogMessage::new(4, "db")])
            .await
            .unwrap();
        manager.leave_group("ops").await.unwrap();

        assert_eq!(
            transport.sent_frames(),
            vec![
                HubFrame::JoinGroup {
                    group: "loggers".to_string()
                },
                HubFrame::SendLogEvents {
                    group: "loggers".to_string(),
                    messages: vec![LogMessage::new(3, "disk")],
                },
                HubFrame::SendLogEventsToOthers {
                    group: "ops".to_string(),
                    messages: vec![LogMessage::new(4, "db")],
                },
                HubFrame::LeaveGroup {
                    group: "ops".to_string()
                },
            ]
        );
    }
}
