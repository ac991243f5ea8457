//! A shipping sink delivers rendered batches to a viewer in the group

use crate::framework::{TestFramework, TestMetrics, TestScenario};
use crate::{RelayFixture, Viewer};
use anyhow::{ensure, Result};
use loghub_types::{GroupTemplate, Level, LogEvent};
use message_sink::{ConnectionState, SinkBuilder, SinkConfig};
use std::time::Duration;

pub struct SinkToViewerTest {
    pub events: usize,
    pub batch_posting_limit: usize,
}

impl Default for SinkToViewerTest {
    fn default() -> Self {
        Self {
            events: 20,
            batch_posting_limit: 5,
        }
    }
}

pub const GROUP: &str = "ops";

#[async_trait::async_trait]
impl TestScenario for SinkToViewerTest {
    async fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let relay = RelayFixture::start(&framework.config().bind_address).await?;
        let mut viewer = Viewer::connect(&relay.url(), GROUP, Duration::from_secs(1)).await?;
        relay.wait_for_members(GROUP, 1).await?;

        let mut config = SinkConfig::with_url(relay.url());
        config.batch_posting_limit = self.batch_posting_limit;
        config.minimum_level = Level::Information;
        config.groups = vec![GroupTemplate::new(GROUP, "{Level:u3} {Message}")?];
        let sink = SinkBuilder::new(config).connect()?;

        if let Some(connection) = sink.connection() {
            connection
                .watch_state()
                .wait_for(|s| s.state == ConnectionState::Connected)
                .await?;
        }

        let handle = sink.handle();
        ensure!(
            !handle.emit(LogEvent::new(Level::Debug, "below the minimum level")),
            "debug event should have been filtered"
        );
        for i in 0..self.events {
            let event = LogEvent::new(Level::Warning, "request {Id} slow").with_property("Id", i);
            ensure!(handle.emit(event), "event {} was not queued", i);
        }

        let (messages, batches) = viewer
            .collect(self.events, Duration::from_secs(10))
            .await?;
        for (i, message) in messages.iter().enumerate() {
            ensure!(
                message.message() == format!("WRN request {} slow", i),
                "unexpected message {:?}",
                message.message()
            );
            ensure!(message.level() == 3, "unexpected level {}", message.level());
        }

        let connect_attempts = sink
            .connection()
            .map(|c| c.connect_attempts())
            .unwrap_or_default();
        sink.shutdown().await;
        viewer.close().await?;
        relay.stop().await;

        Ok(TestMetrics {
            events_emitted: self.events as u64,
            messages_received: messages.len() as u64,
            batches_received: batches,
            connect_attempts,
        })
    }

    fn name(&self) -> &str {
        "sink_to_viewer"
    }

    fn description(&self) -> &str {
        "Events emitted on a sink arrive rendered at a viewer subscribed to the group"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}
