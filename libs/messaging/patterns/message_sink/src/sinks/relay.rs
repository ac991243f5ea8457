//! Remote relay dispatch
//!
//! Batches become `SendLogEvents` invocations on the client connection. The
//! call returns once the transport has accepted the frame; nothing is queued
//! while the connection is down, so batches flushed during an outage fail
//! and are reported by the scheduler.

use crate::{ConnectionManager, GroupDispatch, SinkError};
use async_trait::async_trait;
use loghub_types::LogMessage;

/// Which relay method carries the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Every member of the group, this client included
    #[default]
    Group,
    /// Every member except this client
    Others,
}

#[derive(Debug, Clone)]
pub struct RemoteDispatch {
    connection: ConnectionManager,
    mode: SendMode,
}

impl RemoteDispatch {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            mode: SendMode::Group,
        }
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }
}

#[async_trait]
impl GroupDispatch for RemoteDispatch {
    async fn dispatch(&self, group: &str, messages: Vec<LogMessage>) -> Result<(), SinkError> {
        let sent = match self.mode {
            SendMode::Group => self.connection.send(group, messages).await,
            SendMode::Others => self.connection.send_to_others(group, messages).await,
        };
        sent.map_err(SinkError::from)
    }

    fn name(&self) -> &str {
        "remote"
    }
}
