//! # Fan-out Relay
//!
//! Routes log batches to every session joined to a group. Each session owns
//! a bounded outbox; delivery never waits on a slow session. A full outbox
//! drops that session's copy of the batch and a closed outbox detaches the
//! session.
//!
//! Blank group names are replaced with the default group before any
//! membership or routing step.

use crate::{GroupMembership, RelayError, RelayResult, RelayStats, SessionId};
use dashmap::DashMap;
use loghub_codec::{HubFrame, HubMethod};
use loghub_types::{normalize_group_name, Level, LogMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Receiving end of a session outbox
pub type SessionReceiver = mpsc::Receiver<HubFrame>;

struct SessionHandle {
    outbox: mpsc::Sender<HubFrame>,
    connected_at: Instant,
}

struct RelayInner {
    groups: GroupMembership,
    sessions: DashMap<SessionId, SessionHandle>,
    max_sessions: usize,
    outbound_buffer: usize,
    batches_routed: AtomicU64,
    deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
}

/// Group fan-out relay; cheap to clone, all clones share state
#[derive(Clone)]
pub struct FanoutRelay {
    inner: Arc<RelayInner>,
}

impl std::fmt::Debug for FanoutRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutRelay")
            .field("sessions", &self.inner.sessions.len())
            .field("max_sessions", &self.inner.max_sessions)
            .finish_non_exhaustive()
    }
}

impl Default for FanoutRelay {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_OUTBOUND_BUFFER)
    }
}

impl FanoutRelay {
    pub fn new(max_sessions: usize, outbound_buffer: usize) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                groups: GroupMembership::new(),
                sessions: DashMap::new(),
                max_sessions: max_sessions.max(1),
                outbound_buffer: outbound_buffer.max(1),
                batches_routed: AtomicU64::new(0),
                deliveries: AtomicU64::new(0),
                dropped_deliveries: AtomicU64::new(0),
            }),
        }
    }

    /// Attach a new session and return its id and outbox receiver
    pub fn register_session(&self) -> RelayResult<(SessionId, SessionReceiver)> {
        if self.inner.sessions.len() >= self.inner.max_sessions {
            return Err(RelayError::SessionLimit {
                max: self.inner.max_sessions,
            });
        }

        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.inner.outbound_buffer);
        self.inner.sessions.insert(
            id,
            SessionHandle {
                outbox: tx,
                connected_at: Instant::now(),
            },
        );
        debug!(session = %id, "Session registered");
        Ok((id, rx))
    }

    /// Detach a session and drop all of its memberships
    ///
    /// The session's outbox closes once any in-flight deliveries drain.
    pub fn unregister_session(&self, session: &SessionId) -> bool {
        let removed = self.inner.sessions.remove(session);
        let groups = self.inner.groups.leave_all(session);
        match removed {
            Some((_, handle)) => {
                info!(
                    session = %session,
                    groups,
                    connected_for_ms = handle.connected_at.elapsed().as_millis() as u64,
                    "Session unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, session: &SessionId) -> bool {
        self.inner.sessions.contains_key(session)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn join_group(&self, session: &SessionId, group: &str) -> RelayResult<()> {
        // Holding the entry makes `unregister_session` wait, so its
        // `leave_all` runs after this join
        let _entry = self
            .inner
            .sessions
            .get(session)
            .ok_or(RelayError::UnknownSession(*session))?;
        self.inner.groups.join(*session, normalize_group_name(group));
        Ok(())
    }

    pub fn leave_group(&self, session: &SessionId, group: &str) -> RelayResult<()> {
        if !self.is_registered(session) {
            return Err(RelayError::UnknownSession(*session));
        }
        self.inner.groups.leave(session, normalize_group_name(group));
        Ok(())
    }

    pub fn group_members(&self, group: &str) -> Vec<SessionId> {
        self.inner.groups.members(normalize_group_name(group))
    }

    pub fn groups_of(&self, session: &SessionId) -> Vec<String> {
        self.inner.groups.groups_of(session)
    }

    /// Push a batch to every member of `group`
    ///
    /// Returns the number of sessions the batch was queued for. An empty batch
    /// is not routed.
    pub fn send_to_group(&self, group: &str, messages: Vec<LogMessage>) -> usize {
        self.route(None, group, messages)
    }

    /// Push a batch to every member of `group` except `caller`
    pub fn send_to_group_excluding(
        &self,
        caller: &SessionId,
        group: &str,
        messages: Vec<LogMessage>,
    ) -> usize {
        self.route(Some(caller), group, messages)
    }

    pub fn send_one(&self, group: &str, level: Level, text: impl Into<String>) -> usize {
        self.send_to_group(group, vec![LogMessage::with_level(level, text)])
    }

    pub fn send_one_to_others(
        &self,
        caller: &SessionId,
        group: &str,
        level: Level,
        text: impl Into<String>,
    ) -> usize {
        self.send_to_group_excluding(caller, group, vec![LogMessage::with_level(level, text)])
    }

    /// Apply a frame received from a client session
    pub fn dispatch(&self, session: &SessionId, frame: HubFrame) -> RelayResult<()> {
        match frame {
            HubFrame::SendLogEvents { group, messages } => {
                self.send_to_group(&group, messages);
                Ok(())
            }
            HubFrame::SendLogEventsToOthers { group, messages } => {
                self.send_to_group_excluding(session, &group, messages);
                Ok(())
            }
            HubFrame::JoinGroup { group } => self.join_group(session, &group),
            HubFrame::LeaveGroup { group } => self.leave_group(session, &group),
            HubFrame::WriteLogEvents { .. } => Err(RelayError::UnexpectedFrame {
                method: HubMethod::WriteLogEvents.as_str(),
            }),
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            active_sessions: self.inner.sessions.len(),
            groups: self.inner.groups.stats(),
            batches_routed: self.inner.batches_routed.load(Ordering::Relaxed),
            deliveries: self.inner.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.inner.dropped_deliveries.load(Ordering::Relaxed),
        }
    }

    fn route(&self, exclude: Option<&SessionId>, group: &str, messages: Vec<LogMessage>) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let group = normalize_group_name(group);
        self.inner.batches_routed.fetch_add(1, Ordering::Relaxed);

        let frame = HubFrame::WriteLogEvents { messages };
        let mut delivered = 0;
        let mut closed = Vec::new();

        for member in self.inner.groups.members(group) {
            if exclude == Some(&member) {
                continue;
            }
            let Some(outbox) = self.inner.sessions.get(&member).map(|h| h.outbox.clone()) else {
                continue;
            };

            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.inner.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(session = %member, group, "Session outbox full, dropping batch");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(member),
            }
        }

        for session in closed {
            warn!(session = %session, "Session outbox closed, detaching");
            self.unregister_session(&session);
        }

        self.inner
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }
}
