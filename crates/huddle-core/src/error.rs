//! Domain-specific error types following panic-free policy.

use crate::{Color, ConnectionId};
use thiserror::Error;

/// Errors that can occur when constructing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// A match was requested with the wrong number of members
    #[error("Match needs {expected} participants, got {actual}")]
    WrongMatchSize { expected: usize, actual: usize },

    /// The same connection was listed twice for one match
    #[error("Connection listed twice in one match: {connection_id}")]
    DuplicateParticipant { connection_id: ConnectionId },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Reasons a negotiation intent is rejected.
///
/// Rejections never reach the client as errors. The daemon logs them and the
/// client infers the outcome from the next `match-update` it receives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The match has already launched.
    #[error("match is no longer negotiating")]
    NotNegotiating,

    /// The connection is not a participant of this match.
    #[error("{0} is not a participant of this match")]
    UnknownParticipant(ConnectionId),

    /// Another participant already holds the color.
    #[error("color {color} is held by {holder}")]
    ColorTaken { color: Color, holder: ConnectionId },

    /// The color is not part of the configured palette.
    #[error("color {0} is not in the palette")]
    ColorNotAllowed(Color),
}
