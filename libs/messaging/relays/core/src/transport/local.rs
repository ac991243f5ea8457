//! In-process transport
//!
//! Attaches a client session directly to a [`FanoutRelay`] living in the same
//! process. Frames skip encoding entirely; the relay outbox is forwarded onto
//! the transport event channel by a small task per session.

use crate::{FanoutRelay, RelayError, SessionId};
use async_trait::async_trait;
use loghub_codec::HubFrame;
use loghub_network::{HubTransport, TransportError, TransportEvent, TransportEventSender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct LocalSession {
    id: SessionId,
    shutdown: CancellationToken,
}

pub struct LocalTransport {
    relay: FanoutRelay,
    session: Mutex<Option<LocalSession>>,
}

impl LocalTransport {
    pub fn new(relay: FanoutRelay) -> Self {
        Self {
            relay,
            session: Mutex::new(None),
        }
    }

    /// Id of the current session, if one is open
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    pub fn relay(&self) -> &FanoutRelay {
        &self.relay
    }

    fn detach(&self) {
        if let Some(session) = self.session.lock().take() {
            session.shutdown.cancel();
            self.relay.unregister_session(&session.id);
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.detach();
    }
}

#[async_trait]
impl HubTransport for LocalTransport {
    async fn open(&self, events: TransportEventSender) -> Result<(), TransportError> {
        self.detach();

        let (id, mut outbox) = self
            .relay
            .register_session()
            .map_err(|e| TransportError::connection(e.to_string(), self.endpoint()))?;
        let shutdown = CancellationToken::new();

        let forward_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_shutdown.cancelled() => return,
                    next = outbox.recv() => match next {
                        Some(frame) => {
                            if events.send(TransportEvent::Frame(frame)).is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
            }
            // Relay dropped the session without a local close
            debug!(session = %id, "Local session detached by relay");
            let _ = events.send(TransportEvent::Closed(Some(TransportError::ClosedByPeer {
                reason: Some("session detached by relay".to_string()),
            })));
        });

        *self.session.lock() = Some(LocalSession { id, shutdown });
        Ok(())
    }

    async fn send(&self, frame: HubFrame) -> Result<(), TransportError> {
        let id = self.session_id().ok_or(TransportError::NotConnected)?;
        self.relay.dispatch(&id, frame).map_err(|e| match e {
            RelayError::UnknownSession(_) => TransportError::NotConnected,
            other => TransportError::send(other.to_string()),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.detach();
        Ok(())
    }

    fn endpoint(&self) -> String {
        "local://relay".to_string()
    }
}
