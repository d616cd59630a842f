//! Client interface for interacting with the LobbyActor.
//!
//! The `LobbyHandle` provides a cheap-to-clone interface for sending commands
//! to the lobby actor and subscribing to lobby events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `LobbyError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use huddle_core::{Color, ConnectionId, MatchId, MatchSnapshot};

use super::commands::{LobbyCommand, LobbyError, LobbyEvent, LobbyStats};
use crate::broadcast::Outbox;

// ============================================================================
// Lobby Handle
// ============================================================================

/// Handle for interacting with the lobby actor.
///
/// # Usage
///
/// ```ignore
/// let (outbox, mut inbox) = huddled::broadcast::outbox();
/// let id = lobby.connect(None, outbox).await?;
/// lobby.join_queue(&id).await?;
///
/// while let Some(msg) = inbox.recv().await {
///     // match-found, match-update, launch ...
/// }
/// ```
#[derive(Clone)]
pub struct LobbyHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<LobbyCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<LobbyEvent>,
}

impl LobbyHandle {
    pub fn new(
        sender: mpsc::Sender<LobbyCommand>,
        event_sender: broadcast::Sender<LobbyEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers a connection and returns its domain id.
    ///
    /// # Errors
    ///
    /// - `LobbyError::ConnectionAlreadyExists` if `proposed_id` is already live
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn connect(
        &self,
        proposed_id: Option<ConnectionId>,
        outbox: Outbox,
    ) -> Result<ConnectionId, LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::Connect {
            proposed_id,
            outbox,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)?
    }

    /// Puts a connection in the matchmaking queue.
    ///
    /// # Errors
    ///
    /// - `LobbyError::AlreadyQueued` / `AlreadyInMatch` when nothing changed
    /// - `LobbyError::UnknownConnection` if the connection is not registered
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn join_queue(&self, connection_id: &ConnectionId) -> Result<(), LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::JoinQueue {
            connection_id: connection_id.clone(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)?
    }

    /// Takes a connection out of the matchmaking queue.
    ///
    /// # Errors
    ///
    /// - `LobbyError::NotQueued` if it was not waiting
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn leave_queue(&self, connection_id: &ConnectionId) -> Result<(), LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::LeaveQueue {
            connection_id: connection_id.clone(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)?
    }

    /// Claims a color. Resolves once the match actor has applied or rejected it.
    ///
    /// # Errors
    ///
    /// - `LobbyError::Rejected` if the color is taken or not allowed
    /// - `LobbyError::NotInMatch` / `MatchNotFound` for stale intents
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn pick_color(
        &self,
        connection_id: &ConnectionId,
        match_id: &MatchId,
        color: Color,
    ) -> Result<(), LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::PickColor {
            connection_id: connection_id.clone(),
            match_id: match_id.clone(),
            color,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)?
    }

    /// Sets the ready flag. Resolves once the match actor has applied it.
    ///
    /// # Errors
    ///
    /// - `LobbyError::NotInMatch` / `MatchNotFound` for stale intents
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn set_ready(
        &self,
        connection_id: &ConnectionId,
        match_id: &MatchId,
        ready: bool,
    ) -> Result<(), LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::SetReady {
            connection_id: connection_id.clone(),
            match_id: match_id.clone(),
            ready,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)?
    }

    /// Reports that a connection's channel terminated.
    ///
    /// # Errors
    ///
    /// - `LobbyError::ChannelClosed` if the actor has shut down
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Result<(), LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::Disconnect {
            connection_id: connection_id.clone(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LobbyError::ChannelClosed)
    }

    /// Looks up a live match. Returns `None` once it launched or aborted.
    pub async fn get_match(&self, match_id: &MatchId) -> Option<MatchSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::GetMatch {
            match_id: match_id.clone(),
            respond_to: tx,
        })
        .await
        .ok()?;
        rx.await.ok().flatten()
    }

    /// Looks up the live match a connection belongs to.
    pub async fn match_of(&self, connection_id: &ConnectionId) -> Option<MatchSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(LobbyCommand::MatchOf {
            connection_id: connection_id.clone(),
            respond_to: tx,
        })
        .await
        .ok()?;
        rx.await.ok().flatten()
    }

    /// Current lobby counters. Returns zeroes if the actor has shut down.
    pub async fn stats(&self) -> LobbyStats {
        let (tx, rx) = oneshot::channel();
        if self
            .send(LobbyCommand::GetStats { respond_to: tx })
            .await
            .is_err()
        {
            return LobbyStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribe to lobby events (formation, launch handoff, abort).
    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.event_sender.subscribe()
    }

    async fn send(&self, cmd: LobbyCommand) -> Result<(), LobbyError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| LobbyError::ChannelClosed)
    }
}
