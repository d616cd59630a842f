//! huddle core - domain types for match coordination
//!
//! This crate provides the pure domain model shared between the daemon
//! (huddled) and the wire protocol: identities, colors, the matchmaking
//! queue and the per-match negotiation state machine. It performs no I/O.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod color;
pub mod error;
pub mod ids;
pub mod negotiation;
pub mod queue;

// Re-exports for convenience
pub use color::Color;
pub use error::{DomainError, DomainResult, NegotiationError};
pub use ids::{ConnectionId, MatchId};
pub use negotiation::{
    LaunchPayload, LaunchSlot, Match, MatchPhase, MatchSnapshot, NegotiationPolicy, Participant,
    ParticipantView,
};
pub use queue::{MatchmakingQueue, QueueEntry, QueueStatus, WaitPolicy};
