//! WebSocket transport
//!
//! One session is a writer task fed by a bounded channel, a keep-alive task
//! that queues pings on the same channel, and a reader task that decodes
//! frames and enforces the server timeout.
//!
//! Two tokens end a session. `shutdown` is the local close and is silent.
//! `ended` is a child of it and is also cancelled when the writer fails or
//! the reader sees the stream end. Only the reader reports
//! [`TransportEvent::Closed`], so a session that fails ends with exactly one.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use loghub_codec::HubFrame;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    HubTransport, Result, TransportError, TransportEvent, TransportEventSender, TransportOptions,
};

struct WsSession {
    outbound: mpsc::Sender<Message>,
    shutdown: CancellationToken,
    ended: CancellationToken,
}

impl WsSession {
    fn is_live(&self) -> bool {
        !self.ended.is_cancelled()
    }
}

/// [`HubTransport`] over a WebSocket connection
pub struct WsTransport {
    url: Url,
    options: TransportOptions,
    session: Mutex<Option<WsSession>>,
}

impl WsTransport {
    /// Accepts `ws`, `wss`, `http` and `https` URLs; http(s) is mapped to ws(s)
    pub fn new(url: &str, options: TransportOptions) -> Result<Self> {
        Ok(Self {
            url: normalize_url(url)?,
            options,
            session: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(WsSession::is_live)
            .unwrap_or(false)
    }

    fn shutdown_session(&self) {
        if let Some(session) = self.session.lock().take() {
            session.shutdown.cancel();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shutdown_session();
    }
}

#[async_trait]
impl HubTransport for WsTransport {
    async fn open(&self, events: TransportEventSender) -> Result<()> {
        self.shutdown_session();

        let handshake_timeout = self.options.handshake_timeout;
        let (stream, _) = match timeout(handshake_timeout, connect_async(self.url.as_str())).await
        {
            Err(_) => {
                return Err(TransportError::HandshakeTimeout {
                    timeout_ms: handshake_timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => return Err(TransportError::connection(e.to_string(), self.url.as_str())),
            Ok(Ok(pair)) => pair,
        };
        debug!(url = %self.url, "WebSocket session opened");

        let (write, read) = stream.split();
        let session = spawn_session(write, read, events, &self.options, self.url.to_string());
        *self.session.lock() = Some(session);
        Ok(())
    }

    async fn send(&self, frame: HubFrame) -> Result<()> {
        let outbound = self
            .session
            .lock()
            .as_ref()
            .filter(|s| s.is_live())
            .map(|s| s.outbound.clone())
            .ok_or(TransportError::NotConnected)?;

        let text = frame.encode()?;
        outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    async fn close(&self) -> Result<()> {
        self.shutdown_session();
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// Start the writer, keep-alive and reader tasks for one session
fn spawn_session<W, R>(
    mut write: W,
    mut read: R,
    events: TransportEventSender,
    options: &TransportOptions,
    endpoint: String,
) -> WsSession
where
    W: Sink<Message, Error = WsError> + Send + Unpin + 'static,
    R: Stream<Item = std::result::Result<Message, WsError>> + Send + Unpin + 'static,
{
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(options.outbound_buffer.max(1));
    let shutdown = CancellationToken::new();
    let ended = shutdown.child_token();
    let write_failure: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

    // Writer
    let writer_ended = ended.clone();
    let writer_failure = Arc::clone(&write_failure);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_ended.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                next = outbound_rx.recv() => match next {
                    Some(message) => {
                        if let Err(e) = write.send(message).await {
                            debug!(error = %e, "WebSocket writer stopped");
                            *writer_failure.lock() = Some(TransportError::websocket(e));
                            writer_ended.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    });

    // Keep-alive
    let ping_tx = outbound_tx.clone();
    let ping_ended = ended.clone();
    let keep_alive = options.keep_alive_interval;
    tokio::spawn(async move {
        let mut ticker = interval(keep_alive);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ping_ended.cancelled() => break,
                _ = ticker.tick() => {
                    if ping_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader
    let reader_shutdown = shutdown.clone();
    let reader_ended = ended.clone();
    let pong_tx = outbound_tx.clone();
    let server_timeout = options.server_timeout;
    tokio::spawn(async move {
        let reason = loop {
            let next = tokio::select! {
                _ = reader_ended.cancelled() => {
                    if reader_shutdown.is_cancelled() {
                        return;
                    }
                    // The writer failed
                    break write_failure
                        .lock()
                        .take()
                        .or(Some(TransportError::ClosedByPeer { reason: None }));
                }
                next = timeout(server_timeout, read.next()) => next,
            };

            match next {
                Err(_) => {
                    break Some(TransportError::ServerTimeout {
                        timeout_ms: server_timeout.as_millis() as u64,
                    })
                }
                Ok(None) => break Some(TransportError::ClosedByPeer { reason: None }),
                Ok(Some(Ok(Message::Text(text)))) => match HubFrame::decode(&text) {
                    Ok(frame) => {
                        if events.send(TransportEvent::Frame(frame)).is_err() {
                            // Nobody is listening for this session anymore
                            reader_ended.cancel();
                            return;
                        }
                    }
                    Err(e) => warn!(endpoint = %endpoint, error = %e, "Dropping undecodable frame"),
                },
                Ok(Some(Ok(Message::Ping(payload)))) => {
                    let _ = pong_tx.send(Message::Pong(payload)).await;
                }
                Ok(Some(Ok(Message::Close(frame)))) => break close_reason(frame),
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => break Some(TransportError::websocket(e)),
            }
        };

        if reader_shutdown.is_cancelled() {
            return;
        }
        reader_ended.cancel();
        debug!(endpoint = %endpoint, reason = ?reason, "WebSocket session ended");
        let _ = events.send(TransportEvent::Closed(reason));
    });

    WsSession {
        outbound: outbound_tx,
        shutdown,
        ended,
    }
}

fn close_reason(frame: Option<CloseFrame<'static>>) -> Option<TransportError> {
    match frame {
        Some(frame) if frame.code != CloseCode::Normal => Some(TransportError::ClosedByPeer {
            reason: Some(format!("{}: {}", u16::from(frame.code), frame.reason)),
        }),
        _ => None,
    }
}

/// Parse an endpoint URL and map http(s) to ws(s)
pub fn normalize_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| TransportError::invalid_url(raw, e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(TransportError::invalid_url(
                raw,
                format!("unsupported scheme '{}'", other),
            ))
        }
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(TransportError::invalid_url(raw, "cannot switch scheme"));
    }
    if url.host_str().is_none() {
        return Err(TransportError::invalid_url(raw, "missing host"));
    }
    Ok(url)
}
