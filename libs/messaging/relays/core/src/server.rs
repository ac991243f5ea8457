//! # Relay Server
//!
//! Accepts WebSocket clients and hands each one to
//! [`handle_connection`](crate::common::handle_connection). Stops accepting
//! when the shutdown token fires; live sessions are closed with it.

use crate::common::{handle_connection, SessionOptions};
use crate::{FanoutRelay, RelayConfig, RelayResult};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct RelayServer {
    listener: TcpListener,
    relay: FanoutRelay,
    options: SessionOptions,
    shutdown: CancellationToken,
    name: String,
}

impl RelayServer {
    /// Bind the configured address with a fresh relay
    pub async fn bind(config: &RelayConfig) -> RelayResult<Self> {
        let relay = FanoutRelay::new(config.relay.max_sessions, config.relay.outbound_buffer);
        Self::bind_with_relay(config, relay).await
    }

    /// Bind the configured address in front of an existing relay
    pub async fn bind_with_relay(config: &RelayConfig, relay: FanoutRelay) -> RelayResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()?).await?;

        Ok(Self {
            listener,
            relay,
            options: SessionOptions {
                handshake_timeout: config.transport.handshake_timeout(),
                keep_alive_interval: config.transport.keep_alive_interval(),
                client_timeout: config.transport.client_timeout(),
            },
            shutdown: CancellationToken::new(),
            name: config.relay.name.clone(),
        })
    }

    pub fn local_addr(&self) -> RelayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay(&self) -> &FanoutRelay {
        &self.relay
    }

    /// Token that stops the accept loop and every session when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> RelayResult<()> {
        let addr = self.local_addr()?;
        info!(relay = %self.name, %addr, "Relay listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            self.relay.clone(),
                            self.options,
                            self.shutdown.child_token(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }

        info!(relay = %self.name, sessions = self.relay.session_count(), "Relay stopped accepting");
        Ok(())
    }
}
