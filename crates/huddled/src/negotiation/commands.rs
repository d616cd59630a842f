//! Commands accepted by a match actor.

use huddle_core::{Color, ConnectionId, MatchSnapshot};
use tokio::sync::oneshot;

use crate::lobby::LobbyError;

/// Commands forwarded by the lobby to one match actor.
///
/// Intent commands carry the caller's oneshot so the response reflects the
/// negotiation outcome rather than mere routing.
#[derive(Debug)]
pub enum MatchCommand {
    PickColor {
        connection_id: ConnectionId,
        color: Color,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    SetReady {
        connection_id: ConnectionId,
        ready: bool,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// A participant's channel terminated. Fire-and-forget.
    Disconnect { connection_id: ConnectionId },

    Snapshot {
        respond_to: oneshot::Sender<Option<MatchSnapshot>>,
    },
}

impl MatchCommand {
    /// Answers a command that can no longer be served by its match.
    pub(crate) fn reject(self, err: LobbyError) {
        match self {
            Self::PickColor { respond_to, .. } | Self::SetReady { respond_to, .. } => {
                let _ = respond_to.send(Err(err));
            }
            Self::Snapshot { respond_to } => {
                let _ = respond_to.send(None);
            }
            Self::Disconnect { .. } => {}
        }
    }
}
