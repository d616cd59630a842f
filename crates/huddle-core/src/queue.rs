//! FIFO matchmaking queue and wait-time estimation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ConnectionId;

// ============================================================================
// Wait Policy
// ============================================================================

/// Match size and wait-estimate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Number of participants per match (N).
    pub match_size: usize,
    /// Seconds of estimated wait per missing participant.
    pub base_wait_secs: u64,
    /// Lower bound on the estimate.
    pub min_wait_secs: u64,
}

impl WaitPolicy {
    pub const DEFAULT_MATCH_SIZE: usize = 4;
    pub const DEFAULT_BASE_WAIT_SECS: u64 = 10;
    pub const DEFAULT_MIN_WAIT_SECS: u64 = 5;

    /// Estimated wait for a queue currently holding `queue_size` connections.
    ///
    /// `max(base * (N - size), min)`, with `N - size` saturating at zero.
    #[must_use]
    pub fn estimate_wait_secs(&self, queue_size: usize) -> u64 {
        let missing = self.match_size.saturating_sub(queue_size) as u64;
        self.base_wait_secs
            .saturating_mul(missing)
            .max(self.min_wait_secs)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            match_size: Self::DEFAULT_MATCH_SIZE,
            base_wait_secs: Self::DEFAULT_BASE_WAIT_SECS,
            min_wait_secs: Self::DEFAULT_MIN_WAIT_SECS,
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

/// A connection waiting for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub connection_id: ConnectionId,
    pub enqueued_at: DateTime<Utc>,
}

/// Snapshot of the queue used for `queue-status` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub estimated_wait_secs: u64,
}

/// Ordered waiting pool of connections seeking a match.
///
/// Only tracks queue membership. Whether a connection is already in a match
/// is known to the owner of the connection registry, which must check that
/// before calling [`MatchmakingQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
    policy: WaitPolicy,
}

impl MatchmakingQueue {
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Appends a connection to the back of the queue.
    ///
    /// Returns `false` (and changes nothing) if it is already queued.
    pub fn enqueue(&mut self, connection_id: ConnectionId) -> bool {
        if self.contains(&connection_id) {
            return false;
        }
        self.entries.push_back(QueueEntry {
            connection_id,
            enqueued_at: Utc::now(),
        });
        true
    }

    /// Removes a connection from the queue, returning its entry if present.
    pub fn dequeue(&mut self, connection_id: &ConnectionId) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.connection_id == connection_id)?;
        self.entries.remove(index)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.iter().any(|e| &e.connection_id == connection_id)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current size and wait estimate.
    pub fn status(&self) -> QueueStatus {
        let queue_size = self.entries.len();
        QueueStatus {
            queue_size,
            estimated_wait_secs: self.policy.estimate_wait_secs(queue_size),
        }
    }

    /// Ids of every queued connection, oldest first.
    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.entries.iter().map(|e| &e.connection_id)
    }

    /// Removes and returns the oldest `match_size` entries if enough are waiting.
    ///
    /// Returns `None` and leaves the queue untouched otherwise.
    pub fn take_group(&mut self) -> Option<Vec<QueueEntry>> {
        let n = self.policy.match_size;
        if n == 0 || self.entries.len() < n {
            return None;
        }
        Some(self.entries.drain(..n).collect())
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new(WaitPolicy::default())
    }
}
