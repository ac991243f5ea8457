//! Hub transport abstraction
//!
//! A transport carries decoded [`HubFrame`]s between one client and the
//! relay. Incoming pushes and the end of the session are reported on the
//! event channel handed to [`HubTransport::open`]; each `open` gets its own
//! channel so events from an older session can be told apart.

use async_trait::async_trait;
use loghub_codec::HubFrame;
use tokio::sync::mpsc;

use crate::{Result, TransportError};

/// Something that happened on an open session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A frame pushed by the peer
    Frame(HubFrame),
    /// The session ended; `None` means a clean close
    Closed(Option<TransportError>),
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Client side of a hub session
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Open a new session, replacing any previous one
    ///
    /// Returns once the session is usable. After that every incoming frame is
    /// delivered on `events`, followed by exactly one `Closed` unless the
    /// session is ended through [`HubTransport::close`].
    async fn open(&self, events: TransportEventSender) -> Result<()>;

    /// Queue a frame on the open session
    ///
    /// Completes when the transport has accepted the frame, not when the peer
    /// has processed it.
    async fn send(&self, frame: HubFrame) -> Result<()>;

    /// End the current session; a no-op when none is open
    async fn close(&self) -> Result<()>;

    /// Human readable endpoint for logs
    fn endpoint(&self) -> String;
}
