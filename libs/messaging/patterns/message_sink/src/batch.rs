//! Group fan-out of buffered events
//!
//! A [`BatchingSink`] turns one buffer of [`LogEvent`]s into one batch per
//! group: each event is rendered with the group's output template and the
//! resulting messages are handed to a [`GroupDispatch`] strategy. Strategies
//! only deliver; rendering and fan-out happen here.

use crate::SinkError;
use async_trait::async_trait;
use loghub_types::{GroupSet, GroupTemplate, LogEvent, LogMessage};
use std::sync::Arc;
use tracing::debug;

/// Delivery strategy for one rendered batch
#[async_trait]
pub trait GroupDispatch: Send + Sync {
    /// Deliver `messages` to every subscriber of `group`
    async fn dispatch(&self, group: &str, messages: Vec<LogMessage>) -> Result<(), SinkError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Outcome of one flush across all groups
#[derive(Debug, Clone, Default)]
pub struct FlushResult {
    /// Number of events in the flushed buffer
    pub events: usize,
    /// Groups whose batch was delivered
    pub dispatched: Vec<String>,
    /// Groups whose batch failed, with the error
    pub failed: Vec<(String, SinkError)>,
}

impl FlushResult {
    /// Number of batches handed to the strategy
    pub fn batches(&self) -> usize {
        self.dispatched.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_partial_success(&self) -> bool {
        !self.dispatched.is_empty() && !self.failed.is_empty()
    }

    pub fn is_complete_failure(&self) -> bool {
        self.dispatched.is_empty() && !self.failed.is_empty()
    }
}

/// Renders buffered events per group and dispatches one batch per group
pub struct BatchingSink {
    groups: GroupSet,
    dispatch: Arc<dyn GroupDispatch>,
}

impl BatchingSink {
    pub fn new(groups: GroupSet, dispatch: Arc<dyn GroupDispatch>) -> Self {
        Self { groups, dispatch }
    }

    pub fn groups(&self) -> &GroupSet {
        &self.groups
    }

    pub fn dispatcher(&self) -> &str {
        self.dispatch.name()
    }

    /// Render `events` for a single group
    pub fn render_group(group: &GroupTemplate, events: &[LogEvent]) -> Vec<LogMessage> {
        events
            .iter()
            .map(|event| {
                let text = group.render(event);
                LogMessage::with_level(event.level(), text.trim_end())
            })
            .collect()
    }

    /// Render `events` for every group, skipping groups with nothing to send
    pub fn render(&self, events: &[LogEvent]) -> Vec<(String, Vec<LogMessage>)> {
        self.groups
            .iter()
            .map(|group| (group.group_name().to_string(), Self::render_group(group, events)))
            .filter(|(_, messages)| !messages.is_empty())
            .collect()
    }

    /// Dispatch one batch per group
    ///
    /// A failing group does not stop the others. An empty buffer dispatches
    /// nothing.
    pub async fn flush(&self, events: &[LogEvent]) -> FlushResult {
        let mut result = FlushResult {
            events: events.len(),
            ..FlushResult::default()
        };
        if events.is_empty() {
            return result;
        }

        for (group, messages) in self.render(events) {
            let count = messages.len();
            match self.dispatch.dispatch(&group, messages).await {
                Ok(()) => {
                    debug!(group = %group, messages = count, dispatcher = self.dispatch.name(), "Batch dispatched");
                    result.dispatched.push(group);
                }
                Err(e) => result.failed.push((group, e)),
            }
        }
        result
    }
}

impl std::fmt::Debug for BatchingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingSink")
            .field("groups", &self.groups.names())
            .field("dispatcher", &self.dispatch.name())
            .finish()
    }
}
