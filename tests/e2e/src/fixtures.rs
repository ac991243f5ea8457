//! Relay and viewer fixtures

use anyhow::{Context, Result};
use loghub_network::{TransportOptions, WsTransport};
use loghub_types::LogMessage;
use message_sink::{ConnectionManager, ConnectionOptions, HandlerError, StartTimeout, Subscription};
use relay_core::{FanoutRelay, RelayConfig, RelayServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A relay server running on a background task
pub struct RelayFixture {
    addr: SocketAddr,
    relay: FanoutRelay,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayFixture {
    pub async fn start(bind_address: &str) -> Result<Self> {
        let mut config = RelayConfig::default();
        config.transport.bind_address = bind_address.to_string();

        let server = RelayServer::bind(&config)
            .await
            .with_context(|| format!("binding relay on {}", bind_address))?;
        let addr = server.local_addr()?;
        let relay = server.relay().clone();
        let shutdown = server.shutdown_token();
        let task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Relay stopped with an error");
            }
        });

        Ok(Self {
            addr,
            relay,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}/loghub", self.addr)
    }

    pub fn relay(&self) -> &FanoutRelay {
        &self.relay
    }

    /// Wait until `group` has at least `members` sessions
    pub async fn wait_for_members(&self, group: &str, members: usize) -> Result<()> {
        for _ in 0..500 {
            if self.relay.group_members(group).len() >= members {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!(
            "group {} has {} members, expected {}",
            group,
            self.relay.group_members(group).len(),
            members
        )
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
        for _ in 0..200 {
            if self.relay.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// A client that joins one group and collects every pushed batch
pub struct Viewer {
    connection: ConnectionManager,
    batches: mpsc::UnboundedReceiver<Vec<LogMessage>>,
    _subscriptions: Vec<Subscription>,
}

impl Viewer {
    pub async fn connect(url: &str, group: &str, retry_delay: Duration) -> Result<Self> {
        let transport = WsTransport::new(url, TransportOptions::default())?;
        let connection = ConnectionManager::with_options(
            Arc::new(transport),
            ConnectionOptions::default().with_retry_delay(retry_delay),
        );

        let (tx, batches) = mpsc::unbounded_channel();
        let pushed = connection.on_message_push(move |messages| {
            let _ = tx.send(messages.to_vec());
        });

        // Membership does not survive a reconnect
        let rejoin = {
            let handle = connection.clone();
            let group = group.to_string();
            connection.on_connected(move || {
                let connection = handle.clone();
                let group = group.clone();
                async move {
                    connection.join_group(&group).await?;
                    Ok::<(), HandlerError>(())
                }
            })
        };

        let started = connection
            .start(StartTimeout::After(Duration::from_secs(5)), &CancellationToken::new())
            .await;
        if !started {
            anyhow::bail!("viewer could not connect to {}", url);
        }

        Ok(Self {
            connection,
            batches,
            _subscriptions: vec![pushed, rejoin],
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Collect pushed messages until `count` have arrived
    pub async fn collect(&mut self, count: usize, within: Duration) -> Result<(Vec<LogMessage>, u64)> {
        let mut messages = Vec::new();
        let mut batches = 0;
        let deadline = tokio::time::Instant::now() + within;

        while messages.len() < count {
            let batch = tokio::time::timeout_at(deadline, self.batches.recv())
                .await
                .with_context(|| format!("received {} of {} messages", messages.len(), count))?
                .context("viewer connection dropped")?;
            batches += 1;
            messages.extend(batch);
        }
        Ok((messages, batches))
    }

    pub async fn close(self) -> Result<()> {
        self.connection.stop(&CancellationToken::new()).await?;
        Ok(())
    }
}
