//! # Client Connection Management
//!
//! Handles one WebSocket client for its whole lifetime. After the handshake
//! the connection is registered as a relay session and split into a read
//! task and a write task:
//!
//! - **Read task**: decodes invocation frames and applies them to the relay;
//!   closes the session when the client stays silent past the client timeout
//! - **Write task**: drains the session outbox onto the socket and sends
//!   keep-alive pings
//!
//! Whichever task ends first tears the session down.

use crate::{FanoutRelay, RelayError, SessionId};
use futures_util::{SinkExt, StreamExt};
use loghub_codec::HubFrame;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing knobs applied to every accepted session
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            keep_alive_interval: Duration::from_secs(15),
            client_timeout: Duration::from_secs(30),
        }
    }
}

/// Serve a single client connection until it closes or `shutdown` fires
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: FanoutRelay,
    options: SessionOptions,
    shutdown: CancellationToken,
) {
    let ws = match timeout(options.handshake_timeout, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            debug!(%peer, "WebSocket handshake timed out");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let (session, mut outbox) = match relay.register_session() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%peer, error = %e, "Rejecting session");
            let _ = write
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Again,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    info!(%peer, %session, "Session connected");

    let session_done = shutdown.child_token();
    let (control_tx, mut control_rx) = mpsc::channel::<Message>(16);

    // Writing task: session outbox and control frames to the socket
    let write_task = {
        let done = session_done.clone();
        let keep_alive = options.keep_alive_interval;
        tokio::spawn(async move {
            let mut ticker = interval(keep_alive);
            ticker.tick().await;
            let mut sent = 0u64;

            loop {
                let message = tokio::select! {
                    _ = done.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    frame = outbox.recv() => match frame {
                        Some(frame) => match frame.encode() {
                            Ok(text) => Message::Text(text),
                            Err(e) => {
                                warn!(%session, error = %e, "Failed to encode push frame");
                                continue;
                            }
                        },
                        None => break,
                    },
                    control = control_rx.recv() => match control {
                        Some(message) => message,
                        None => break,
                    },
                    _ = ticker.tick() => Message::Ping(Vec::new()),
                };

                if let Err(e) = write.send(message).await {
                    debug!(%session, error = %e, "Write failed");
                    break;
                }
                sent += 1;
            }

            debug!(%session, sent, "Write task ended");
        })
    };

    // Reading task: client invocations into the relay
    let read_task = {
        let done = session_done.clone();
        let relay = relay.clone();
        let client_timeout = options.client_timeout;
        tokio::spawn(async move {
            let mut received = 0u64;

            loop {
                let next = tokio::select! {
                    _ = done.cancelled() => break,
                    next = timeout(client_timeout, read.next()) => next,
                };

                match next {
                    Err(_) => {
                        info!(%session, "Client timed out");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Ok(Message::Text(text)))) => {
                        received += 1;
                        apply_frame(&relay, &session, &text);
                    }
                    Ok(Some(Ok(Message::Ping(payload)))) => {
                        let _ = control_tx.send(Message::Pong(payload)).await;
                    }
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        debug!(%session, error = %e, "Read failed");
                        break;
                    }
                }
            }

            debug!(%session, received, "Read task ended");
        })
    };

    tokio::select! {
        _ = read_task => {}
        _ = write_task => {}
    }
    session_done.cancel();

    relay.unregister_session(&session);
    info!(%peer, %session, "Session closed");
}

fn apply_frame(relay: &FanoutRelay, session: &SessionId, text: &str) {
    let frame = match HubFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%session, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match relay.dispatch(session, frame) {
        Ok(()) => {}
        Err(e @ RelayError::UnexpectedFrame { .. }) => {
            warn!(%session, error = %e, "Client sent a relay-only frame");
        }
        Err(e) => debug!(%session, error = %e, "Frame not applied"),
    }
}
