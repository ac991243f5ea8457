//! In-process relay dispatch
//!
//! For hosts that run the relay themselves: batches are pushed straight to
//! the group members of a [`FanoutRelay`] as `WriteLogEvents`, with no
//! client session in between.

use crate::{GroupDispatch, SinkError};
use async_trait::async_trait;
use loghub_types::LogMessage;
use relay_core::FanoutRelay;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct DirectDispatch {
    relay: FanoutRelay,
}

impl DirectDispatch {
    pub fn new(relay: FanoutRelay) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &FanoutRelay {
        &self.relay
    }
}

#[async_trait]
impl GroupDispatch for DirectDispatch {
    async fn dispatch(&self, group: &str, messages: Vec<LogMessage>) -> Result<(), SinkError> {
        let delivered = self.relay.send_to_group(group, messages);
        trace!(group, delivered, "Batch pushed to local relay");
        Ok(())
    }

    fn name(&self) -> &str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchingSink;
    use loghub_codec::HubFrame;
    use loghub_types::{GroupSet, GroupTemplate, Level, LogEvent, DEFAULT_GROUP_NAME};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_flush_reaches_group_members() {
        let relay = FanoutRelay::default();
        let (viewer, mut outbox) = relay.register_session().unwrap();
        relay.join_group(&viewer, "audit").unwrap();
        let (idle, mut idle_outbox) = relay.register_session().unwrap();
        relay.join_group(&idle, "other").unwrap();

        let groups =
            GroupSet::merge_with_default(vec![GroupTemplate::new("audit", "{Message}").unwrap()])
                .unwrap();
        let sink = BatchingSink::new(groups, Arc::new(DirectDispatch::new(relay.clone())));

        sink.flush(&[
            LogEvent::new(Level::Information, "user {User} logged in").with_property("User", "ann"),
        ])
        .await;

        assert_eq!(
            outbox.recv().await.unwrap(),
            HubFrame::WriteLogEvents {
                messages: vec![LogMessage::new(2, "user ann logged in")],
            }
        );
        assert!(idle_outbox.try_recv().is_err());
        assert!(relay.group_members(DEFAULT_GROUP_NAME).is_empty());
    }
}
