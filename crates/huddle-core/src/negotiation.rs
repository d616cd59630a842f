//! Match negotiation state machine.
//!
//! A [`Match`] is created fully formed and starts in
//! [`MatchPhase::Negotiating`]. Participants claim colors and toggle their
//! ready flag; once every participant is ready with a color the match can be
//! launched exactly once. Aborts (a participant disconnecting) are not a
//! tracked phase: the owner simply drops the `Match`.
//!
//! This module is pure state. Broadcasting, locking and teardown are the
//! daemon's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::error::{DomainError, DomainResult, NegotiationError};
use crate::{Color, ConnectionId, MatchId};

// ============================================================================
// Phase & Policy
// ============================================================================

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPhase {
    /// Participants are picking colors and confirming readiness.
    #[default]
    Negotiating,

    /// Every participant converged; ownership has passed to the game session.
    Launched,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negotiating => write!(f, "negotiating"),
            Self::Launched => write!(f, "launched"),
        }
    }
}

/// Tunable negotiation rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationPolicy {
    /// Clear a participant's ready flag whenever it changes color.
    ///
    /// Off by default: a color change keeps the participant ready.
    pub reset_ready_on_color_change: bool,

    /// Colors participants may claim. Empty means any valid color.
    pub palette: Vec<Color>,
}

impl NegotiationPolicy {
    /// Returns true if the palette permits this color.
    pub fn allows(&self, color: &Color) -> bool {
        self.palette.is_empty() || self.palette.contains(color)
    }
}

// ============================================================================
// Participants & Views
// ============================================================================

/// A connection's negotiation state within one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub color: Option<Color>,
    pub ready: bool,
}

impl Participant {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            color: None,
            ready: false,
        }
    }

    /// Ready with a color: this participant satisfies the launch condition.
    pub fn is_settled(&self) -> bool {
        self.ready && self.color.is_some()
    }
}

/// Wire view of a participant (`match-update` entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: ConnectionId,
    pub color: Option<Color>,
    pub ready: bool,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.connection_id.clone(),
            color: p.color.clone(),
            ready: p.ready,
        }
    }
}

/// One participant's final configuration in a launch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSlot {
    pub id: ConnectionId,
    pub color: Color,
}

/// Everything the game session needs to take over a launched match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPayload {
    pub match_id: MatchId,
    pub participants: Vec<LaunchSlot>,
}

impl LaunchPayload {
    /// Color assigned to a connection, if it is part of this launch.
    pub fn color_of(&self, connection_id: &ConnectionId) -> Option<&Color> {
        self.participants
            .iter()
            .find(|slot| &slot.id == connection_id)
            .map(|slot| &slot.color)
    }
}

/// Read-only view of a match for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub participants: Vec<ParticipantView>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Match
// ============================================================================

/// A fixed-size group of connections negotiating colors and readiness.
#[derive(Debug, Clone)]
pub struct Match {
    id: MatchId,
    phase: MatchPhase,
    participants: Vec<Participant>,
    policy: NegotiationPolicy,
    created_at: DateTime<Utc>,
}

impl Match {
    /// Creates a match with every member attached at once.
    ///
    /// # Errors
    ///
    /// - `DomainError::WrongMatchSize` if `members.len() != expected_size`
    /// - `DomainError::DuplicateParticipant` if a connection appears twice
    pub fn new(
        id: MatchId,
        members: Vec<ConnectionId>,
        expected_size: usize,
        policy: NegotiationPolicy,
    ) -> DomainResult<Self> {
        if members.len() != expected_size {
            return Err(DomainError::WrongMatchSize {
                expected: expected_size,
                actual: members.len(),
            });
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(member) {
                return Err(DomainError::DuplicateParticipant {
                    connection_id: member.clone(),
                });
            }
        }

        Ok(Self {
            id,
            phase: MatchPhase::Negotiating,
            participants: members.into_iter().map(Participant::new).collect(),
            policy,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &MatchId {
        &self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.connection_id == connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.participant(connection_id).is_some()
    }

    /// Participant ids in formation order.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .map(|p| p.connection_id.clone())
            .collect()
    }

    /// Every participant except `connection_id`.
    pub fn others<'a>(
        &'a self,
        connection_id: &'a ConnectionId,
    ) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.participants
            .iter()
            .map(|p| &p.connection_id)
            .filter(move |id| *id != connection_id)
    }

    /// Claims `color` for a participant.
    ///
    /// Re-picking one's own color is accepted as a no-op overwrite.
    ///
    /// # Errors
    ///
    /// - `NotNegotiating` once launched
    /// - `UnknownParticipant` for a connection outside this match
    /// - `ColorNotAllowed` if the palette excludes the color
    /// - `ColorTaken` if another participant holds it
    pub fn pick_color(
        &mut self,
        connection_id: &ConnectionId,
        color: Color,
    ) -> Result<(), NegotiationError> {
        self.ensure_negotiating()?;

        if !self.policy.allows(&color) {
            return Err(NegotiationError::ColorNotAllowed(color));
        }

        if let Some(holder) = self
            .participants
            .iter()
            .find(|p| p.color.as_ref() == Some(&color) && &p.connection_id != connection_id)
        {
            return Err(NegotiationError::ColorTaken {
                color,
                holder: holder.connection_id.clone(),
            });
        }

        let reset_ready = self.policy.reset_ready_on_color_change;
        let participant = self.participant_mut(connection_id)?;

        let changed = participant.color.as_ref() != Some(&color);
        if changed && reset_ready {
            participant.ready = false;
        }
        participant.color = Some(color);

        debug!(
            match_id = %self.id,
            connection_id = %connection_id,
            changed,
            "Color picked"
        );
        Ok(())
    }

    /// Sets a participant's ready flag verbatim.
    ///
    /// # Errors
    ///
    /// - `NotNegotiating` once launched
    /// - `UnknownParticipant` for a connection outside this match
    pub fn set_ready(
        &mut self,
        connection_id: &ConnectionId,
        ready: bool,
    ) -> Result<(), NegotiationError> {
        self.ensure_negotiating()?;
        self.participant_mut(connection_id)?.ready = ready;
        Ok(())
    }

    /// True while negotiating and every participant is ready with a color.
    pub fn is_launch_ready(&self) -> bool {
        self.phase == MatchPhase::Negotiating
            && !self.participants.is_empty()
            && self.participants.iter().all(Participant::is_settled)
    }

    /// Launches the match if the launch condition holds.
    ///
    /// Returns the payload exactly once: after a successful launch the phase
    /// is `Launched` and later calls return `None`.
    pub fn try_launch(&mut self) -> Option<LaunchPayload> {
        if !self.is_launch_ready() {
            return None;
        }

        let participants = self
            .participants
            .iter()
            .filter_map(|p| {
                p.color.clone().map(|color| LaunchSlot {
                    id: p.connection_id.clone(),
                    color,
                })
            })
            .collect();

        self.phase = MatchPhase::Launched;

        Some(LaunchPayload {
            match_id: self.id.clone(),
            participants,
        })
    }

    /// Current participant list for `match-update`.
    pub fn views(&self) -> Vec<ParticipantView> {
        self.participants.iter().map(ParticipantView::from).collect()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_id: self.id.clone(),
            phase: self.phase,
            participants: self.views(),
            created_at: self.created_at,
        }
    }

    fn ensure_negotiating(&self) -> Result<(), NegotiationError> {
        if self.phase == MatchPhase::Negotiating {
            Ok(())
        } else {
            Err(NegotiationError::NotNegotiating)
        }
    }

    fn participant_mut(
        &mut self,
        connection_id: &ConnectionId,
    ) -> Result<&mut Participant, NegotiationError> {
        self.participants
            .iter_mut()
            .find(|p| &p.connection_id == connection_id)
            .ok_or_else(|| NegotiationError::UnknownParticipant(connection_id.clone()))
    }
}
