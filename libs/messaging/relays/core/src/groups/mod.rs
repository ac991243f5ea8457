//! # Group Membership Registry
//!
//! Many-to-many mapping between sessions and group names. Both directions
//! are kept so that a departing session can be removed from every group
//! without scanning all of them. Empty groups are dropped.
//!
//! Names are taken as given: callers normalize blank names before they reach
//! the registry.

use crate::{GroupStats, SessionId};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Default)]
pub struct GroupMembership {
    /// Group name to member sessions
    groups: DashMap<String, HashSet<SessionId>>,
    /// Reverse mapping: session to joined groups
    session_groups: DashMap<SessionId, HashSet<String>>,
}

impl GroupMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a group; returns false if it was already a member
    pub fn join(&self, session: SessionId, group: &str) -> bool {
        let added = self
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(session);

        self.session_groups
            .entry(session)
            .or_default()
            .insert(group.to_string());

        if added {
            debug!(%session, group, "Session joined group");
        }
        added
    }

    /// Remove a session from a group; returns false if it was not a member
    pub fn leave(&self, session: &SessionId, group: &str) -> bool {
        let removed = match self.groups.get_mut(group) {
            Some(mut members) => members.remove(session),
            None => false,
        };
        self.groups.remove_if(group, |_, members| members.is_empty());

        if let Some(mut joined) = self.session_groups.get_mut(session) {
            joined.remove(group);
        }
        self.session_groups
            .remove_if(session, |_, joined| joined.is_empty());

        if removed {
            debug!(%session, group, "Session left group");
        }
        removed
    }

    /// Remove a session from every group it joined
    pub fn leave_all(&self, session: &SessionId) -> usize {
        let Some((_, joined)) = self.session_groups.remove(session) else {
            return 0;
        };

        for group in &joined {
            if let Some(mut members) = self.groups.get_mut(group) {
                members.remove(session);
            }
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
        debug!(%session, groups = joined.len(), "Session removed from all groups");
        joined.len()
    }

    pub fn members(&self, group: &str) -> Vec<SessionId> {
        self.groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub fn is_member(&self, session: &SessionId, group: &str) -> bool {
        self.groups
            .get(group)
            .map(|members| members.contains(session))
            .unwrap_or(false)
    }

    pub fn groups_of(&self, session: &SessionId) -> Vec<String> {
        self.session_groups
            .get(session)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_groups(&self) -> Vec<String> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            total_groups: self.groups.len(),
            total_sessions: self.session_groups.len(),
            total_memberships: self
                .session_groups
                .iter()
                .map(|entry| entry.value().len())
                .sum(),
        }
    }
}
