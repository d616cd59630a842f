//! Lobby actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `LobbyActor`:
//! - `LobbyCommand`: Commands sent to the actor
//! - `LobbyError`: Errors that can occur during lobby operations
//! - `LobbyEvent`: Events published by the lobby for subscribers
//! - `MatchReport`: Teardown reports sent by match actors back to the lobby
//!
//! All types are designed for async message passing and follow the panic-free policy.

use huddle_core::{Color, ConnectionId, LaunchPayload, MatchId, MatchSnapshot, NegotiationError};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::broadcast::Outbox;

// ============================================================================
// Lobby Commands
// ============================================================================

/// Commands sent to the lobby actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum LobbyCommand {
    /// Register a freshly handshaken connection.
    ///
    /// # Errors
    /// - `LobbyError::ConnectionAlreadyExists` if the proposed id is live
    Connect {
        /// Id proposed by the client, or `None` to have one generated
        proposed_id: Option<ConnectionId>,
        /// Where notifications for this connection are delivered
        outbox: Outbox,
        respond_to: oneshot::Sender<Result<ConnectionId, LobbyError>>,
    },

    /// Enter the matchmaking queue.
    ///
    /// # Errors
    /// - `LobbyError::AlreadyQueued` / `AlreadyInMatch` (treated as no-ops)
    JoinQueue {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// Leave the matchmaking queue.
    ///
    /// # Errors
    /// - `LobbyError::NotQueued` if the connection was not waiting
    LeaveQueue {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// Claim a color in a match. Forwarded to the match actor, which responds.
    PickColor {
        connection_id: ConnectionId,
        match_id: MatchId,
        color: Color,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// Set the ready flag in a match. Forwarded to the match actor, which responds.
    SetReady {
        connection_id: ConnectionId,
        match_id: MatchId,
        ready: bool,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// The connection's channel terminated.
    ///
    /// Always succeeds; unknown connections are ignored.
    Disconnect {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<()>,
    },

    /// Look up a match by id.
    GetMatch {
        match_id: MatchId,
        respond_to: oneshot::Sender<Option<MatchSnapshot>>,
    },

    /// Look up the match a connection currently belongs to.
    MatchOf {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<MatchSnapshot>>,
    },

    /// Get counters for logging and tests.
    GetStats {
        respond_to: oneshot::Sender<LobbyStats>,
    },
}

/// Counters describing the lobby's current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LobbyStats {
    pub connections: usize,
    pub queued: usize,
    pub active_matches: usize,
}

// ============================================================================
// Match Reports
// ============================================================================

/// Sent by a match actor when its match is torn down.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub match_id: MatchId,
    /// Every participant the match was formed with
    pub members: Vec<ConnectionId>,
    pub outcome: MatchOutcome,
}

/// How a match ended.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// All participants converged; the payload goes to the game session.
    Launched(LaunchPayload),

    /// A participant disconnected mid-negotiation.
    Aborted { disconnected: ConnectionId },
}

// ============================================================================
// Lobby Errors
// ============================================================================

/// Errors that can occur during lobby operations.
///
/// None of these reach clients as error messages: intents racing with
/// teardown are expected, and rejected negotiation intents are visible only
/// as the absence of a state change in the next `match-update`.
#[derive(Debug, Clone, Error)]
pub enum LobbyError {
    /// A live connection already uses this id.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),

    /// The connection is not registered (never connected or already gone).
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection is already waiting in the queue.
    #[error("connection already queued: {0}")]
    AlreadyQueued(ConnectionId),

    /// The connection is already negotiating in a match.
    #[error("connection {connection_id} is already in match {match_id}")]
    AlreadyInMatch {
        connection_id: ConnectionId,
        match_id: MatchId,
    },

    /// The connection is not in the queue.
    #[error("connection not queued: {0}")]
    NotQueued(ConnectionId),

    /// The intent names a match the connection does not belong to.
    #[error("connection {connection_id} is not in match {match_id}")]
    NotInMatch {
        connection_id: ConnectionId,
        match_id: MatchId,
    },

    /// The match no longer exists (launched or aborted).
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    /// The match rejected the intent.
    #[error("rejected: {0}")]
    Rejected(#[from] NegotiationError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Lobby Events
// ============================================================================

/// Events published by the lobby to subscribers.
///
/// `MatchLaunched` is the session handoff: whoever owns the game session
/// subscribes and takes over from the payload.
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    /// A match was formed from the queue.
    MatchFormed {
        match_id: MatchId,
        participants: Vec<ConnectionId>,
    },

    /// A match launched. Boxed to reduce enum size variance.
    MatchLaunched(Box<LaunchPayload>),

    /// A match was aborted by a disconnect.
    MatchAborted {
        match_id: MatchId,
        disconnected: ConnectionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_error_display() {
        let err = LobbyError::UnknownConnection(ConnectionId::new("c-1"));
        assert_eq!(err.to_string(), "unknown connection: c-1");

        let err = LobbyError::MatchNotFound(MatchId::new("m-1"));
        assert_eq!(err.to_string(), "match not found: m-1");

        let err = LobbyError::NotInMatch {
            connection_id: ConnectionId::new("c-1"),
            match_id: MatchId::new("m-2"),
        };
        assert_eq!(err.to_string(), "connection c-1 is not in match m-2");

        let err = LobbyError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");
    }

    #[test]
    fn test_negotiation_error_converts() {
        let err: LobbyError = NegotiationError::NotNegotiating.into();
        assert!(matches!(err, LobbyError::Rejected(NegotiationError::NotNegotiating)));
        assert_eq!(err.to_string(), "rejected: match is no longer negotiating");
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<(), LobbyError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
