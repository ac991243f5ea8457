//! Network Infrastructure
//!
//! Client-side session plumbing for the log hub: the [`HubTransport`] seam
//! the connection manager drives, its error and option types, and the
//! WebSocket implementation used against a remote relay.

pub mod error;
pub mod options;
pub mod transport;
pub mod ws;

pub use error::{Result, TransportError};
pub use options::{
    TransportOptions, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_KEEP_ALIVE_INTERVAL,
    DEFAULT_OUTBOUND_BUFFER, DEFAULT_SERVER_TIMEOUT,
};
pub use transport::{HubTransport, TransportEvent, TransportEventReceiver, TransportEventSender};
pub use ws::{normalize_url, WsTransport};
