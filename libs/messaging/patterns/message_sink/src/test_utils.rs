//! Test doubles for connection and sink code
//!
//! [`ScriptedTransport`] stands in for a relay connection and
//! [`RecordingDispatch`] collects the batches a sink hands out.
//! [`RecordingObserver`] keeps the connection lifecycle calls.

use crate::{ConnectionObserver, GroupDispatch, SinkError};
use async_trait::async_trait;
use loghub_codec::HubFrame;
use loghub_network::{
    HubTransport, Result as TransportResult, TransportError, TransportEvent, TransportEventSender,
};
use loghub_types::LogMessage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Transport whose behavior is scripted by the test
///
/// Fails the first `n` opens, optionally sleeps before each open, records
/// every attempt and every frame sent, and lets the test end the session as
/// if the peer had dropped it.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    failures_left: AtomicUsize,
    latency: Mutex<Duration>,
    open_attempts: AtomicUsize,
    successful_opens: AtomicUsize,
    close_calls: AtomicUsize,
    opening: AtomicUsize,
    max_opening: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
    session: Mutex<Option<TransportEventSender>>,
    previous: Mutex<Option<TransportEventSender>>,
    sent: Mutex<Vec<HubFrame>>,
    fail_sends: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` opens
    pub fn failing(times: usize) -> Self {
        let transport = Self::new();
        transport.failures_left.store(times, Ordering::SeqCst);
        transport
    }

    /// Sleep this long inside every open
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn fail_next_opens(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn successful_opens(&self) -> usize {
        self.successful_opens.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Most opens ever in progress at the same time
    pub fn max_concurrent_opens(&self) -> usize {
        self.max_opening.load(Ordering::SeqCst)
    }

    /// When each open attempt started
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }

    pub fn sent_frames(&self) -> Vec<HubFrame> {
        self.sent.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Deliver a `WriteLogEvents` push on the open session
    pub fn push(&self, messages: Vec<LogMessage>) -> bool {
        match self.session.lock().as_ref() {
            Some(events) => events
                .send(TransportEvent::Frame(HubFrame::WriteLogEvents { messages }))
                .is_ok(),
            None => false,
        }
    }

    /// End the open session as if the peer dropped it
    pub fn drop_session(&self, error: Option<TransportError>) -> bool {
        match self.session.lock().take() {
            Some(events) => events.send(TransportEvent::Closed(error)).is_ok(),
            None => false,
        }
    }

    /// Report a close on the session that was ended by `close`
    pub fn close_previous_session(&self, error: Option<TransportError>) -> bool {
        match self.previous.lock().take() {
            Some(events) => events.send(TransportEvent::Closed(error)).is_ok(),
            None => false,
        }
    }
}

struct OpeningGuard<'a>(&'a AtomicUsize);

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HubTransport for ScriptedTransport {
    async fn open(&self, events: TransportEventSender) -> TransportResult<()> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());

        let opening = self.opening.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_opening.fetch_max(opening, Ordering::SeqCst);
        let _guard = OpeningGuard(&self.opening);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TransportError::connection(
                "scripted failure",
                self.endpoint(),
            ));
        }

        *self.session.lock() = Some(events);
        self.successful_opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: HubFrame) -> TransportResult<()> {
        if self.session.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::send("scripted send failure"));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = self.session.lock().take() {
            *self.previous.lock() = Some(events);
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        "scripted://relay".to_string()
    }
}

/// Dispatcher that keeps every batch it is given
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    batches: Mutex<Vec<(String, Vec<LogMessage>)>>,
    failing_groups: Mutex<Vec<String>>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every batch addressed to `group`
    pub fn fail_group(&self, group: impl Into<String>) {
        self.failing_groups.lock().push(group.into());
    }

    pub fn batches(&self) -> Vec<(String, Vec<LogMessage>)> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Every message sent to `group`, across batches
    pub fn messages_for(&self, group: &str) -> Vec<LogMessage> {
        self.batches
            .lock()
            .iter()
            .filter(|(g, _)| g == group)
            .flat_map(|(_, messages)| messages.iter().cloned())
            .collect()
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

#[async_trait]
impl GroupDispatch for RecordingDispatch {
    async fn dispatch(&self, group: &str, messages: Vec<LogMessage>) -> Result<(), SinkError> {
        if self.failing_groups.lock().iter().any(|g| g == group) {
            return Err(SinkError::dispatch(group, "scripted dispatch failure"));
        }
        self.batches.lock().push((group.to_string(), messages));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A lifecycle call seen by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    ConnectFailed { attempt: u64 },
    Connected,
    Closed { error: bool },
}

/// Observer that keeps every lifecycle call in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// Attempt numbers passed to `connect_failed`, in order
    pub fn failed_attempts(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::ConnectFailed { attempt } => Some(*attempt),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &ObservedEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn connect_failed(&self, _endpoint: &str, attempt: u64, _error: &TransportError) {
        self.events
            .lock()
            .push(ObservedEvent::ConnectFailed { attempt });
    }

    fn connected(&self, _endpoint: &str) {
        self.events.lock().push(ObservedEvent::Connected);
    }

    fn closed(&self, _endpoint: &str, error: Option<&TransportError>) {
        self.events.lock().push(ObservedEvent::Closed {
            error: error.is_some(),
        });
    }
}
