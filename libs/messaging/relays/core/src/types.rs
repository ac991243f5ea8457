//! # Relay Types
//!
//! Identifiers and statistics shared by the relay components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one client session attached to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Counters reported by [`crate::FanoutRelay::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub active_sessions: usize,
    pub groups: GroupStats,
    /// Batches handed to `send_to_group` that reached at least the routing step
    pub batches_routed: u64,
    /// Per-session deliveries queued on an outbox
    pub deliveries: u64,
    /// Deliveries skipped because a session outbox was full
    pub dropped_deliveries: u64,
}

/// Group membership statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub total_groups: usize,
    pub total_sessions: usize,
    pub total_memberships: usize,
}
