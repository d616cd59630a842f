//! Protocol message types for client/daemon communication.
//!
//! Messages are JSON objects with a kebab-case `type` tag and camelCase
//! payload fields, sent one per line.

use crate::version::ProtocolVersion;
use huddle_core::{
    Color, ConnectionId, LaunchPayload, MatchId, MatchSnapshot, ParticipantView, QueueStatus,
};
use serde::{Deserialize, Serialize};

/// Intents a client can send to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MessageType {
    /// Client handshake
    Connect {
        /// Proposed connection id (optional, daemon assigns one otherwise)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Enter the matchmaking queue
    JoinQueue,

    /// Leave the matchmaking queue
    LeaveQueue,

    /// Claim a color in the caller's match
    PickColor { match_id: MatchId, color: Color },

    /// Set the caller's ready flag
    SetReady { match_id: MatchId, ready: bool },

    /// Query a match; defaults to the caller's own match
    GetMatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        match_id: Option<MatchId>,
    },

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client closing the channel gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn join_queue() -> Self {
        Self::new(MessageType::JoinQueue)
    }

    pub fn leave_queue() -> Self {
        Self::new(MessageType::LeaveQueue)
    }

    pub fn pick_color(match_id: MatchId, color: Color) -> Self {
        Self::new(MessageType::PickColor { match_id, color })
    }

    pub fn set_ready(match_id: MatchId, ready: bool) -> Self {
        Self::new(MessageType::SetReady { match_id, ready })
    }

    pub fn get_match(match_id: Option<MatchId>) -> Self {
        Self::new(MessageType::GetMatch { match_id })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Notifications and responses sent from daemon to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Handshake accepted
    Connected {
        protocol_version: ProtocolVersion,
        /// Domain identity assigned to this connection
        connection_id: ConnectionId,
    },

    /// Handshake rejected (version mismatch, id already live)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Queue size and wait estimate, sent to every queued connection
    QueueStatus {
        searching: bool,
        queue_size: usize,
        estimated_wait_seconds: u64,
    },

    /// A match was formed with the caller in it
    MatchFound {
        match_id: MatchId,
        participant_ids: Vec<ConnectionId>,
    },

    /// Full participant list after a negotiation change
    MatchUpdate {
        match_id: MatchId,
        participants: Vec<ParticipantView>,
    },

    /// The match launched; sent once
    Launch(LaunchPayload),

    /// A participant left, the match is aborted
    PeerDisconnected {
        match_id: MatchId,
        connection_id: ConnectionId,
    },

    /// Response to `get-match`; no snapshot means "match not found"
    MatchState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Box<MatchSnapshot>>,
    },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Protocol-level error (malformed message); domain rejections never use this
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    pub fn connected(connection_id: ConnectionId) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            connection_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn queue_status(status: QueueStatus, searching: bool) -> Self {
        Self::QueueStatus {
            searching,
            queue_size: status.queue_size,
            estimated_wait_seconds: status.estimated_wait_secs,
        }
    }

    pub fn match_found(match_id: MatchId, participant_ids: Vec<ConnectionId>) -> Self {
        Self::MatchFound {
            match_id,
            participant_ids,
        }
    }

    pub fn match_update(match_id: MatchId, participants: Vec<ParticipantView>) -> Self {
        Self::MatchUpdate {
            match_id,
            participants,
        }
    }

    pub fn launch(payload: LaunchPayload) -> Self {
        Self::Launch(payload)
    }

    pub fn peer_disconnected(match_id: MatchId, connection_id: ConnectionId) -> Self {
        Self::PeerDisconnected {
            match_id,
            connection_id,
        }
    }

    pub fn match_state(snapshot: Option<MatchSnapshot>) -> Self {
        Self::MatchState {
            snapshot: snapshot.map(Box::new),
        }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Short name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Rejected { .. } => "rejected",
            Self::QueueStatus { .. } => "queue-status",
            Self::MatchFound { .. } => "match-found",
            Self::MatchUpdate { .. } => "match-update",
            Self::Launch(_) => "launch",
            Self::PeerDisconnected { .. } => "peer-disconnected",
            Self::MatchState { .. } => "match-state",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}
