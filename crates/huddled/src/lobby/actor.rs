//! Lobby actor - owns connections, the queue, and the match table.
//!
//! The LobbyActor is the single owner of coordination state outside of
//! individual matches. It processes commands sequentially, forms matches
//! synchronously on enqueue, and forwards negotiation intents to the
//! owning match actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use huddle_core::{
    Color, ConnectionId, Match, MatchId, MatchSnapshot, MatchmakingQueue, NegotiationPolicy,
    WaitPolicy,
};
use huddle_protocol::ServerMessage;

use super::commands::{LobbyCommand, LobbyError, LobbyEvent, LobbyStats, MatchOutcome, MatchReport};
use super::registry::{ConnectionRegistry, Membership};
use crate::broadcast::{fan_out, send_to, Outbox};
use crate::negotiation::{spawn_match, MatchCommand, MatchHandle};

/// Buffer for teardown reports from match actors.
pub const REPORT_BUFFER: usize = 64;

/// Tunables the lobby hands to the queue and to every match it forms.
#[derive(Debug, Clone, Default)]
pub struct LobbySettings {
    pub wait: WaitPolicy,
    pub negotiation: NegotiationPolicy,
}

// ============================================================================
// Lobby Actor
// ============================================================================

/// The lobby actor.
///
/// # Ownership
///
/// - `registry`: every live connection, its outbox and its membership
/// - `queue`: FIFO of connections waiting for a match
/// - `matches`: handles of running match actors
///
/// Match state itself lives in the match actors; the lobby only routes to them
/// and learns about teardown through `MatchReport`s.
pub struct LobbyActor {
    /// Command receiver
    receiver: mpsc::Receiver<LobbyCommand>,

    registry: ConnectionRegistry,

    queue: MatchmakingQueue,

    matches: HashMap<MatchId, MatchHandle>,

    negotiation: NegotiationPolicy,

    /// Event publisher for session handoff and observers
    event_publisher: broadcast::Sender<LobbyEvent>,

    /// Cloned into every spawned match actor
    reports_tx: mpsc::Sender<MatchReport>,
    reports_rx: mpsc::Receiver<MatchReport>,
}

impl LobbyActor {
    /// Creates a new lobby actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `settings` - Queue and negotiation policies
    pub fn new(
        receiver: mpsc::Receiver<LobbyCommand>,
        event_publisher: broadcast::Sender<LobbyEvent>,
        settings: LobbySettings,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(REPORT_BUFFER);
        Self {
            receiver,
            registry: ConnectionRegistry::new(),
            queue: MatchmakingQueue::new(settings.wait),
            matches: HashMap::new(),
            negotiation: settings.negotiation,
            event_publisher,
            reports_tx,
            reports_rx,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Match reports are always drained before the next command, so an intent
    /// sent after a client saw `launch` or `peer-disconnected` finds its
    /// membership already released.
    pub async fn run(mut self) {
        info!(
            match_size = self.queue.policy().match_size,
            "Lobby actor starting"
        );

        loop {
            tokio::select! {
                biased;
                Some(report) = self.reports_rx.recv() => self.handle_report(report),
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        info!(
            connections = self.registry.len(),
            queued = self.queue.size(),
            matches = self.matches.len(),
            "Lobby actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::Connect {
                proposed_id,
                outbox,
                respond_to,
            } => {
                let result = self.handle_connect(proposed_id, outbox);
                let _ = respond_to.send(result);
            }
            LobbyCommand::JoinQueue {
                connection_id,
                respond_to,
            } => {
                let result = self.handle_join_queue(connection_id);
                let _ = respond_to.send(result);
            }
            LobbyCommand::LeaveQueue {
                connection_id,
                respond_to,
            } => {
                let result = self.handle_leave_queue(connection_id);
                let _ = respond_to.send(result);
            }
            LobbyCommand::PickColor {
                connection_id,
                match_id,
                color,
                respond_to,
            } => {
                self.handle_pick_color(connection_id, match_id, color, respond_to);
            }
            LobbyCommand::SetReady {
                connection_id,
                match_id,
                ready,
                respond_to,
            } => {
                self.handle_set_ready(connection_id, match_id, ready, respond_to);
            }
            LobbyCommand::Disconnect {
                connection_id,
                respond_to,
            } => {
                self.handle_disconnect(connection_id);
                let _ = respond_to.send(());
            }
            LobbyCommand::GetMatch {
                match_id,
                respond_to,
            } => {
                self.request_snapshot(&match_id, respond_to);
            }
            LobbyCommand::MatchOf {
                connection_id,
                respond_to,
            } => match self.registry.membership(&connection_id) {
                Some(Membership::Matched(match_id)) => {
                    let match_id = match_id.clone();
                    self.request_snapshot(&match_id, respond_to);
                }
                _ => {
                    let _ = respond_to.send(None);
                }
            },
            LobbyCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_connect(
        &mut self,
        proposed_id: Option<ConnectionId>,
        outbox: Outbox,
    ) -> Result<ConnectionId, LobbyError> {
        let connection_id = proposed_id.unwrap_or_else(ConnectionId::generate);
        self.registry.register(connection_id.clone(), outbox)?;

        info!(
            connection_id = %connection_id,
            connections = self.registry.len(),
            "Connection registered"
        );
        Ok(connection_id)
    }

    fn handle_join_queue(&mut self, connection_id: ConnectionId) -> Result<(), LobbyError> {
        match self.registry.membership(&connection_id) {
            None => return Err(LobbyError::UnknownConnection(connection_id)),
            Some(Membership::Queued) => {
                debug!(connection_id = %connection_id, "Join-queue ignored, already queued");
                return Err(LobbyError::AlreadyQueued(connection_id));
            }
            Some(Membership::Matched(match_id)) => {
                debug!(
                    connection_id = %connection_id,
                    match_id = %match_id,
                    "Join-queue ignored, already in match"
                );
                return Err(LobbyError::AlreadyInMatch {
                    match_id: match_id.clone(),
                    connection_id,
                });
            }
            Some(Membership::Idle) => {}
        }

        self.queue.enqueue(connection_id.clone());
        self.registry
            .set_membership(&connection_id, Membership::Queued);
        debug!(
            connection_id = %connection_id,
            queue_size = self.queue.size(),
            "Connection queued"
        );

        self.broadcast_queue_status();
        self.form_matches();
        Ok(())
    }

    fn handle_leave_queue(&mut self, connection_id: ConnectionId) -> Result<(), LobbyError> {
        if !self.registry.contains(&connection_id) {
            return Err(LobbyError::UnknownConnection(connection_id));
        }
        if self.queue.dequeue(&connection_id).is_none() {
            debug!(connection_id = %connection_id, "Leave-queue ignored, not queued");
            return Err(LobbyError::NotQueued(connection_id));
        }
        self.registry.set_membership(&connection_id, Membership::Idle);

        if let Some(outbox) = self.registry.outbox(&connection_id) {
            send_to(
                &connection_id,
                outbox,
                ServerMessage::queue_status(self.queue.status(), false),
            );
        }
        debug!(
            connection_id = %connection_id,
            queue_size = self.queue.size(),
            "Connection left queue"
        );

        self.broadcast_queue_status();
        Ok(())
    }

    fn handle_pick_color(
        &mut self,
        connection_id: ConnectionId,
        match_id: MatchId,
        color: Color,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    ) {
        let cmd = MatchCommand::PickColor {
            connection_id: connection_id.clone(),
            color,
            respond_to,
        };
        self.forward_intent(&connection_id, &match_id, cmd);
    }

    fn handle_set_ready(
        &mut self,
        connection_id: ConnectionId,
        match_id: MatchId,
        ready: bool,
        respond_to: oneshot::Sender<Result<(), LobbyError>>,
    ) {
        let cmd = MatchCommand::SetReady {
            connection_id: connection_id.clone(),
            ready,
            respond_to,
        };
        self.forward_intent(&connection_id, &match_id, cmd);
    }

    /// Routes a negotiation intent to its match if the sender belongs to it.
    fn forward_intent(&self, connection_id: &ConnectionId, match_id: &MatchId, cmd: MatchCommand) {
        let membership = match self.registry.membership(connection_id) {
            Some(m) => m,
            None => {
                debug!(connection_id = %connection_id, "Intent from unknown connection ignored");
                cmd.reject(LobbyError::UnknownConnection(connection_id.clone()));
                return;
            }
        };

        if membership != &Membership::Matched(match_id.clone()) {
            debug!(
                connection_id = %connection_id,
                match_id = %match_id,
                "Intent for foreign or stale match ignored"
            );
            cmd.reject(LobbyError::NotInMatch {
                connection_id: connection_id.clone(),
                match_id: match_id.clone(),
            });
            return;
        }

        match self.matches.get(match_id) {
            Some(handle) => {
                if let Err(cmd) = handle.forward(cmd) {
                    debug!(match_id = %match_id, "Match already closed, intent dropped");
                    cmd.reject(LobbyError::MatchNotFound(match_id.clone()));
                }
            }
            None => cmd.reject(LobbyError::MatchNotFound(match_id.clone())),
        }
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let entry = match self.registry.unregister(&connection_id) {
            Some(entry) => entry,
            None => {
                debug!(connection_id = %connection_id, "Disconnect for unknown connection ignored");
                return;
            }
        };
        let connected_secs = (Utc::now() - entry.connected_at).num_seconds();

        match entry.membership {
            Membership::Idle => {}
            Membership::Queued => {
                self.queue.dequeue(&connection_id);
                self.broadcast_queue_status();
            }
            Membership::Matched(match_id) => {
                if let Some(handle) = self.matches.get(&match_id) {
                    let cmd = MatchCommand::Disconnect {
                        connection_id: connection_id.clone(),
                    };
                    if handle.forward(cmd).is_err() {
                        debug!(match_id = %match_id, "Match already closed, disconnect dropped");
                    }
                }
            }
        }

        info!(
            connection_id = %connection_id,
            connected_secs,
            connections = self.registry.len(),
            "Connection unregistered"
        );
    }

    fn request_snapshot(
        &self,
        match_id: &MatchId,
        respond_to: oneshot::Sender<Option<MatchSnapshot>>,
    ) {
        let cmd = MatchCommand::Snapshot { respond_to };
        match self.matches.get(match_id) {
            Some(handle) => {
                if let Err(cmd) = handle.forward(cmd) {
                    cmd.reject(LobbyError::MatchNotFound(match_id.clone()));
                }
            }
            None => cmd.reject(LobbyError::MatchNotFound(match_id.clone())),
        }
    }

    fn stats(&self) -> LobbyStats {
        LobbyStats {
            connections: self.registry.len(),
            queued: self.queue.size(),
            active_matches: self.matches.len(),
        }
    }

    // ========================================================================
    // Queue and Formation
    // ========================================================================

    /// Sends the current queue size and wait estimate to every queued connection.
    fn broadcast_queue_status(&self) {
        if self.queue.is_empty() {
            return;
        }
        let msg = ServerMessage::queue_status(self.queue.status(), true);
        fan_out(self.registry.recipients(self.queue.members()), &msg);
    }

    /// Forms matches while the queue holds enough connections.
    fn form_matches(&mut self) {
        let mut formed = false;
        while let Some(group) = self.queue.take_group() {
            let members: Vec<ConnectionId> =
                group.into_iter().map(|entry| entry.connection_id).collect();
            self.form_match(members);
            formed = true;
        }
        if formed {
            self.broadcast_queue_status();
        }
    }

    /// Creates one match from `members` and spawns its actor.
    fn form_match(&mut self, members: Vec<ConnectionId>) {
        let match_id = MatchId::generate();
        let expected = self.queue.policy().match_size;

        let state = match Match::new(
            match_id.clone(),
            members.clone(),
            expected,
            self.negotiation.clone(),
        ) {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Failed to form match, members returned to idle");
                for member in &members {
                    self.registry.set_membership(member, Membership::Idle);
                }
                return;
            }
        };

        let outboxes: Vec<(ConnectionId, Outbox)> = members
            .iter()
            .filter_map(|id| {
                self.registry
                    .outbox(id)
                    .map(|outbox| (id.clone(), outbox.clone()))
            })
            .collect();

        // match-found goes out before the actor can emit any match-update
        let found = ServerMessage::match_found(match_id.clone(), members.clone());
        fan_out(outboxes.iter().map(|(id, tx)| (id, tx)), &found);

        for member in &members {
            self.registry
                .set_membership(member, Membership::Matched(match_id.clone()));
        }

        let handle = spawn_match(state, outboxes, self.reports_tx.clone());
        self.matches.insert(match_id.clone(), handle);

        info!(
            match_id = %match_id,
            participants = members.len(),
            active_matches = self.matches.len(),
            "Match formed"
        );

        let _ = self.event_publisher.send(LobbyEvent::MatchFormed {
            match_id,
            participants: members,
        });
    }

    // ========================================================================
    // Match Reports
    // ========================================================================

    /// Releases a torn-down match and its members.
    fn handle_report(&mut self, report: MatchReport) {
        let MatchReport {
            match_id,
            members,
            outcome,
        } = report;

        if self.matches.remove(&match_id).is_none() {
            warn!(match_id = %match_id, "Report for unknown match");
        }

        for member in &members {
            if self.registry.membership(member) == Some(&Membership::Matched(match_id.clone())) {
                self.registry.set_membership(member, Membership::Idle);
            }
        }

        let event = match outcome {
            MatchOutcome::Launched(payload) => {
                info!(match_id = %match_id, "Match released after launch");
                LobbyEvent::MatchLaunched(Box::new(payload))
            }
            MatchOutcome::Aborted { disconnected } => {
                info!(
                    match_id = %match_id,
                    disconnected = %disconnected,
                    "Match released after abort"
                );
                LobbyEvent::MatchAborted {
                    match_id,
                    disconnected,
                }
            }
        };

        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{outbox, OutboxReceiver};

    fn create_actor(match_size: usize) -> (LobbyActor, broadcast::Receiver<LobbyEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let settings = LobbySettings {
            wait: WaitPolicy {
                match_size,
                ..WaitPolicy::default()
            },
            negotiation: NegotiationPolicy::default(),
        };
        (LobbyActor::new(cmd_rx, event_tx, settings), event_rx)
    }

    fn connect(actor: &mut LobbyActor, name: &str) -> (ConnectionId, OutboxReceiver) {
        let (tx, rx) = outbox();
        let id = actor
            .handle_connect(Some(ConnectionId::new(name)), tx)
            .unwrap();
        (id, rx)
    }

    fn drain(rx: &mut OutboxReceiver) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_connect_duplicate_id_rejected() {
        let (mut actor, _) = create_actor(4);
        connect(&mut actor, "a");

        let (tx, _rx) = outbox();
        let (respond_to, rx) = oneshot::channel();
        actor.handle_command(LobbyCommand::Connect {
            proposed_id: Some(ConnectionId::new("a")),
            outbox: tx,
            respond_to,
        });
        assert!(matches!(
            rx.await.unwrap(),
            Err(LobbyError::ConnectionAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_generates_id() {
        let (mut actor, _) = create_actor(4);
        let (tx, _rx) = outbox();
        let id = actor.handle_connect(None, tx).unwrap();
        assert!(!id.as_str().is_empty());
        assert!(actor.registry.contains(&id));
    }

    #[tokio::test]
    async fn test_join_queue_broadcasts_size_to_all_queued() {
        let (mut actor, _) = create_actor(4);
        let (a, mut rx_a) = connect(&mut actor, "a");
        let (b, mut rx_b) = connect(&mut actor, "b");

        actor.handle_join_queue(a).unwrap();
        actor.handle_join_queue(b).unwrap();

        let a_msgs = drain(&mut rx_a);
        assert_eq!(a_msgs.len(), 2);
        assert!(matches!(
            a_msgs.last(),
            Some(ServerMessage::QueueStatus {
                searching: true,
                queue_size: 2,
                estimated_wait_seconds: 20
            })
        ));
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerMessage::QueueStatus { queue_size: 2, .. }]
        ));
    }

    #[tokio::test]
    async fn test_join_queue_twice_is_noop() {
        let (mut actor, _) = create_actor(4);
        let (a, _rx) = connect(&mut actor, "a");

        actor.handle_join_queue(a.clone()).unwrap();
        let err = actor.handle_join_queue(a).unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyQueued(_)));
        assert_eq!(actor.queue.size(), 1);
    }

    #[tokio::test]
    async fn test_join_queue_unknown_connection() {
        let (mut actor, _) = create_actor(4);
        let err = actor
            .handle_join_queue(ConnectionId::new("ghost"))
            .unwrap_err();
        assert!(matches!(err, LobbyError::UnknownConnection(_)));
    }

    #[tokio::test]
    async fn test_leave_queue_notifies_leaver_and_rest() {
        let (mut actor, _) = create_actor(4);
        let (a, mut rx_a) = connect(&mut actor, "a");
        let (b, mut rx_b) = connect(&mut actor, "b");
        actor.handle_join_queue(a.clone()).unwrap();
        actor.handle_join_queue(b).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        actor.handle_leave_queue(a.clone()).unwrap();

        assert!(matches!(
            drain(&mut rx_a).as_slice(),
            [ServerMessage::QueueStatus {
                searching: false,
                queue_size: 1,
                ..
            }]
        ));
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerMessage::QueueStatus {
                searching: true,
                queue_size: 1,
                ..
            }]
        ));
        assert_eq!(actor.registry.membership(&a), Some(&Membership::Idle));

        let err = actor.handle_leave_queue(a).unwrap_err();
        assert!(matches!(err, LobbyError::NotQueued(_)));
    }

    #[tokio::test]
    async fn test_formation_consumes_oldest_entries() {
        let (mut actor, mut events) = create_actor(2);
        let (a, mut rx_a) = connect(&mut actor, "a");
        let (b, mut rx_b) = connect(&mut actor, "b");
        let (c, mut rx_c) = connect(&mut actor, "c");

        actor.handle_join_queue(a.clone()).unwrap();
        actor.handle_join_queue(b.clone()).unwrap();
        actor.handle_join_queue(c.clone()).unwrap();

        assert_eq!(actor.matches.len(), 1);
        assert_eq!(actor.queue.size(), 1);
        assert!(actor.queue.contains(&c));

        let match_id = match actor.registry.membership(&a) {
            Some(Membership::Matched(id)) => id.clone(),
            other => panic!("Expected Matched, got {other:?}"),
        };
        assert_eq!(
            actor.registry.membership(&b),
            Some(&Membership::Matched(match_id.clone()))
        );
        assert_eq!(actor.registry.membership(&c), Some(&Membership::Queued));

        for rx in [&mut rx_a, &mut rx_b] {
            let found = drain(rx)
                .into_iter()
                .find(|m| matches!(m, ServerMessage::MatchFound { .. }));
            assert_eq!(
                found,
                Some(ServerMessage::match_found(
                    match_id.clone(),
                    vec![a.clone(), b.clone()]
                ))
            );
        }
        assert!(drain(&mut rx_c)
            .iter()
            .all(|m| matches!(m, ServerMessage::QueueStatus { .. })));

        assert!(matches!(
            events.try_recv().unwrap(),
            LobbyEvent::MatchFormed { participants, .. } if participants == vec![a, b]
        ));
    }

    #[tokio::test]
    async fn test_join_while_matched_is_noop() {
        let (mut actor, _) = create_actor(2);
        let (a, _rx_a) = connect(&mut actor, "a");
        let (b, _rx_b) = connect(&mut actor, "b");
        actor.handle_join_queue(a.clone()).unwrap();
        actor.handle_join_queue(b).unwrap();

        let err = actor.handle_join_queue(a).unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyInMatch { .. }));
        assert!(actor.queue.is_empty());
    }

    #[tokio::test]
    async fn test_intent_for_foreign_match_rejected() {
        let (mut actor, _) = create_actor(2);
        let (a, _rx_a) = connect(&mut actor, "a");

        let (respond_to, rx) = oneshot::channel();
        actor.handle_command(LobbyCommand::PickColor {
            connection_id: a,
            match_id: MatchId::new("nope"),
            color: Color::parse("red").unwrap(),
            respond_to,
        });
        assert!(matches!(
            rx.await.unwrap(),
            Err(LobbyError::NotInMatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_while_queued_rebroadcasts() {
        let (mut actor, _) = create_actor(4);
        let (a, _rx_a) = connect(&mut actor, "a");
        let (b, mut rx_b) = connect(&mut actor, "b");
        actor.handle_join_queue(a.clone()).unwrap();
        actor.handle_join_queue(b).unwrap();
        drain(&mut rx_b);

        actor.handle_disconnect(a.clone());

        assert!(!actor.registry.contains(&a));
        assert_eq!(actor.queue.size(), 1);
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerMessage::QueueStatus { queue_size: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn test_disconnect_unknown_is_noop() {
        let (mut actor, _) = create_actor(4);
        actor.handle_disconnect(ConnectionId::new("ghost"));
        assert_eq!(actor.stats(), LobbyStats::default());
    }

    #[tokio::test]
    async fn test_report_releases_members() {
        let (mut actor, mut events) = create_actor(2);
        let (a, _rx_a) = connect(&mut actor, "a");
        let (b, _rx_b) = connect(&mut actor, "b");
        actor.handle_join_queue(a.clone()).unwrap();
        actor.handle_join_queue(b.clone()).unwrap();
        let _ = events.try_recv();

        let match_id = match actor.registry.membership(&a) {
            Some(Membership::Matched(id)) => id.clone(),
            other => panic!("Expected Matched, got {other:?}"),
        };

        actor.handle_report(MatchReport {
            match_id: match_id.clone(),
            members: vec![a.clone(), b.clone()],
            outcome: MatchOutcome::Aborted {
                disconnected: b.clone(),
            },
        });

        assert!(actor.matches.is_empty());
        assert_eq!(actor.registry.membership(&a), Some(&Membership::Idle));
        assert!(matches!(
            events.try_recv().unwrap(),
            LobbyEvent::MatchAborted { disconnected, .. } if disconnected == b
        ));

        // Released members can queue again
        actor.handle_join_queue(a).unwrap();
    }

    #[tokio::test]
    async fn test_get_stats() {
        let (mut actor, _) = create_actor(4);
        let (a, _rx) = connect(&mut actor, "a");
        connect(&mut actor, "b");
        actor.handle_join_queue(a).unwrap();

        assert_eq!(
            actor.stats(),
            LobbyStats {
                connections: 2,
                queued: 1,
                active_matches: 0,
            }
        );
    }
}
