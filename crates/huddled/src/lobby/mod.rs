//! Lobby: connection registry, matchmaking queue, and match table.
//!
//! The lobby is the coordination hub. Connection handlers send it intents
//! through a [`LobbyHandle`]; it forms matches from the queue and routes
//! negotiation intents to the per-match actors.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  LobbyCommand  ┌──────────────┐  LobbyEvent  ┌───────────────┐
//! │ ConnectionHandler│───────────────▶│  LobbyActor  │─────────────▶│ Session       │
//! └──────────────────┘  (mpsc)        └──────────────┘  (broadcast) │ handoff       │
//!          ▲                             │       ▲                  └───────────────┘
//!          │ queue-status / match-found  │       │ MatchReport
//!          └─────────────────────────────┘  ┌────┴───────┐
//!                                           │ MatchActor │ (one per match)
//!                                           └────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;
mod registry;

pub use actor::{LobbyActor, LobbySettings, REPORT_BUFFER};
pub use commands::{LobbyCommand, LobbyError, LobbyEvent, LobbyStats, MatchOutcome, MatchReport};
pub use handle::LobbyHandle;
pub use registry::{ConnectionEntry, ConnectionRegistry, Membership};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 100;

/// Spawn the lobby actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use huddled::lobby::{spawn_lobby, LobbySettings};
///
/// #[tokio::main]
/// async fn main() {
///     let lobby = spawn_lobby(LobbySettings::default());
///     let stats = lobby.stats().await;
///     assert_eq!(stats.connections, 0);
/// }
/// ```
pub fn spawn_lobby(settings: LobbySettings) -> LobbyHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = LobbyActor::new(cmd_rx, event_tx.clone(), settings);
    tokio::spawn(actor.run());

    LobbyHandle::new(cmd_tx, event_tx)
}
