//! Sink and viewer both recover when the relay restarts on the same address

use crate::framework::{TestFramework, TestMetrics, TestScenario};
use crate::{RelayFixture, Viewer};
use anyhow::{ensure, Context, Result};
use loghub_types::{Level, LogEvent, DEFAULT_GROUP_NAME};
use message_sink::{ConnectionState, ConnectionStatus, SinkBuilder, SinkConfig};
use std::time::Duration;
use tokio::sync::watch;

pub struct RelayRestartTest {
    pub retry_delay: Duration,
}

impl Default for RelayRestartTest {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
        }
    }
}

async fn wait_for_state(
    status: &mut watch::Receiver<ConnectionStatus>,
    description: &str,
    reached: impl FnMut(&ConnectionStatus) -> bool,
) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(10), status.wait_for(reached))
        .await
        .with_context(|| format!("connection never became {}", description))??;
    Ok(())
}

fn connected(status: &ConnectionStatus) -> bool {
    status.state == ConnectionState::Connected
}

#[async_trait::async_trait]
impl TestScenario for RelayRestartTest {
    async fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let relay = RelayFixture::start(&framework.config().bind_address).await?;
        let mut viewer = Viewer::connect(&relay.url(), DEFAULT_GROUP_NAME, self.retry_delay).await?;
        relay.wait_for_members(DEFAULT_GROUP_NAME, 1).await?;

        let mut config = SinkConfig::with_url(relay.url());
        config.wait_before_retry_secs = Some(self.retry_delay.as_secs().max(1));
        config.batch_posting_limit = 1;
        let sink = SinkBuilder::new(config).connect()?;
        let connection = sink.connection().context("remote sink has a connection")?.clone();
        let mut status = connection.watch_state();
        wait_for_state(&mut status, "connected", connected).await?;

        sink.handle().emit(LogEvent::new(Level::Information, "before restart"));
        let (before, _) = viewer.collect(1, Duration::from_secs(5)).await?;

        let addr = relay.addr();
        relay.stop().await;
        wait_for_state(&mut status, "disconnected", |s| !connected(s)).await?;

        let relay = RelayFixture::start(&addr.to_string()).await?;
        wait_for_state(&mut status, "connected again", connected).await?;
        relay.wait_for_members(DEFAULT_GROUP_NAME, 1).await?;
        ensure!(
            connection.connect_attempts() >= 2,
            "sink did not reconnect ({} attempts)",
            connection.connect_attempts()
        );

        sink.handle().emit(LogEvent::new(Level::Information, "after restart"));
        let (after, _) = viewer.collect(1, Duration::from_secs(5)).await?;
        ensure!(
            after[0].message().ends_with("after restart"),
            "unexpected message {:?}",
            after[0].message()
        );

        let metrics = TestMetrics {
            events_emitted: 2,
            messages_received: (before.len() + after.len()) as u64,
            batches_received: 2,
            connect_attempts: connection.connect_attempts(),
        };

        drop(status);
        sink.shutdown().await;
        viewer.close().await?;
        relay.stop().await;
        Ok(metrics)
    }

    fn name(&self) -> &str {
        "relay_restart"
    }

    fn description(&self) -> &str {
        "A relay restart is survived by both the shipping sink and the viewer"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(45)
    }
}
