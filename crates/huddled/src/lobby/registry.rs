//! Connection registry: live client identities and their outboxes.
//!
//! Owned exclusively by the lobby actor. Besides the outbox, each entry
//! records where the connection currently is (idle, queued, or in a match),
//! which is how the "at most one queue entry and at most one match"
//! invariant is enforced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use huddle_core::{ConnectionId, MatchId};

use super::commands::LobbyError;
use crate::broadcast::Outbox;

/// Where a connection currently belongs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Membership {
    #[default]
    Idle,
    Queued,
    Matched(MatchId),
}

/// One live connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub outbox: Outbox,
    pub membership: Membership,
    pub connected_at: DateTime<Utc>,
}

/// Table of live connections keyed by their domain id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    ///
    /// # Errors
    ///
    /// `LobbyError::ConnectionAlreadyExists` if the id is already live.
    pub fn register(&mut self, connection_id: ConnectionId, outbox: Outbox) -> Result<(), LobbyError> {
        if self.connections.contains_key(&connection_id) {
            return Err(LobbyError::ConnectionAlreadyExists(connection_id));
        }
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                outbox,
                membership: Membership::Idle,
                connected_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn membership(&self, connection_id: &ConnectionId) -> Option<&Membership> {
        self.connections.get(connection_id).map(|e| &e.membership)
    }

    /// Updates a connection's membership. Returns false if it is not registered.
    pub fn set_membership(&mut self, connection_id: &ConnectionId, membership: Membership) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(entry) => {
                entry.membership = membership;
                true
            }
            None => false,
        }
    }

    pub fn outbox(&self, connection_id: &ConnectionId) -> Option<&Outbox> {
        self.connections.get(connection_id).map(|e| &e.outbox)
    }

    /// Resolves ids to `(id, outbox)` pairs, skipping unregistered ones.
    pub fn recipients<'a, I>(&'a self, ids: I) -> Vec<(&'a ConnectionId, &'a Outbox)>
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        ids.into_iter()
            .filter_map(|id| self.outbox(id).map(|outbox| (id, outbox)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
