//! Per-match negotiation actors.
//!
//! Each formed match gets its own [`MatchActor`] task. The lobby holds a
//! [`MatchHandle`] and forwards participant intents without awaiting the
//! outcome; the actor answers the caller directly.
//!
//! ```text
//! ┌──────────────┐  MatchCommand   ┌──────────────┐  match-update / launch
//! │  LobbyActor  │────────────────▶│  MatchActor  │──────────────────────▶ outboxes
//! └──────────────┘ (unbounded mpsc)└──────────────┘
//!         ▲                               │
//!         └──────── MatchReport ──────────┘
//!              (teardown, bounded mpsc)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - A closed match channel hands the command back to the caller

use tokio::sync::mpsc;

use huddle_core::{ConnectionId, Match};

use crate::broadcast::Outbox;
use crate::lobby::MatchReport;

mod actor;
mod commands;

pub use actor::MatchActor;
pub use commands::MatchCommand;

/// Lobby-side handle to a running match actor.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    sender: mpsc::UnboundedSender<MatchCommand>,
}

impl MatchHandle {
    /// Forwards a command without waiting.
    ///
    /// # Errors
    ///
    /// Returns the command if the match actor has already torn down.
    pub fn forward(&self, cmd: MatchCommand) -> Result<(), MatchCommand> {
        self.sender.send(cmd).map_err(|e| e.0)
    }
}

/// Spawns a match actor for a freshly formed match.
///
/// `outboxes` must list the participants in formation order.
pub fn spawn_match(
    state: Match,
    outboxes: Vec<(ConnectionId, Outbox)>,
    reports: mpsc::Sender<MatchReport>,
) -> MatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = MatchActor::new(rx, state, outboxes, reports);
    tokio::spawn(actor.run());

    MatchHandle { sender: tx }
}
