//! Match actor - owns one match's negotiation state.
//!
//! Every match runs on its own task, so intents for different matches are
//! processed concurrently while intents for the same match are serialized
//! through its channel.
//!
//! # Teardown ordering
//!
//! When the match launches or aborts, the actor first reports to the lobby
//! and only then notifies participants. A client can therefore never act on
//! a `launch` or `peer-disconnected` notification before the lobby has
//! released its membership.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_core::{ConnectionId, LaunchPayload, Match, MatchId};
use huddle_protocol::ServerMessage;

use super::commands::MatchCommand;
use crate::broadcast::{fan_out, Outbox};
use crate::lobby::{LobbyError, MatchOutcome, MatchReport};

/// Why the actor loop ended.
#[derive(Debug)]
enum Teardown {
    Launched(LaunchPayload),
    Aborted { disconnected: ConnectionId },
}

/// The match actor - exclusive owner of a [`Match`] and its participants.
pub struct MatchActor {
    receiver: mpsc::UnboundedReceiver<MatchCommand>,
    state: Match,
    /// Participant outboxes in formation order
    outboxes: Vec<(ConnectionId, Outbox)>,
    reports: mpsc::Sender<MatchReport>,
}

impl MatchActor {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<MatchCommand>,
        state: Match,
        outboxes: Vec<(ConnectionId, Outbox)>,
        reports: mpsc::Sender<MatchReport>,
    ) -> Self {
        Self {
            receiver,
            state,
            outboxes,
            reports,
        }
    }

    pub fn match_id(&self) -> &MatchId {
        self.state.id()
    }

    /// Runs the actor until the match launches, aborts, or the lobby drops it.
    pub async fn run(mut self) {
        debug!(match_id = %self.match_id(), "Match actor starting");

        let mut teardown = None;
        while let Some(cmd) = self.receiver.recv().await {
            if let Some(t) = self.handle_command(cmd) {
                teardown = Some(t);
                break;
            }
        }

        match teardown {
            Some(t) => self.close(t).await,
            None => debug!(match_id = %self.match_id(), "Match channel closed"),
        }
    }

    /// Applies one command. Returns `Some` when the match must be torn down.
    fn handle_command(&mut self, cmd: MatchCommand) -> Option<Teardown> {
        match cmd {
            MatchCommand::PickColor {
                connection_id,
                color,
                respond_to,
            } => match self.state.pick_color(&connection_id, color) {
                Ok(()) => {
                    self.broadcast_update();
                    let _ = respond_to.send(Ok(()));
                    self.state.try_launch().map(Teardown::Launched)
                }
                Err(e) => {
                    debug!(
                        match_id = %self.match_id(),
                        connection_id = %connection_id,
                        reason = %e,
                        "Pick-color rejected"
                    );
                    let _ = respond_to.send(Err(e.into()));
                    None
                }
            },

            MatchCommand::SetReady {
                connection_id,
                ready,
                respond_to,
            } => match self.state.set_ready(&connection_id, ready) {
                Ok(()) => {
                    self.broadcast_update();
                    let _ = respond_to.send(Ok(()));
                    self.state.try_launch().map(Teardown::Launched)
                }
                Err(e) => {
                    debug!(
                        match_id = %self.match_id(),
                        connection_id = %connection_id,
                        reason = %e,
                        "Set-ready rejected"
                    );
                    let _ = respond_to.send(Err(e.into()));
                    None
                }
            },

            MatchCommand::Disconnect { connection_id } => {
                if self.state.contains(&connection_id) {
                    Some(Teardown::Aborted {
                        disconnected: connection_id,
                    })
                } else {
                    debug!(
                        match_id = %self.match_id(),
                        connection_id = %connection_id,
                        "Disconnect for non-participant ignored"
                    );
                    None
                }
            }

            MatchCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(Some(self.state.snapshot()));
                None
            }
        }
    }

    /// Sends the full participant list to every participant.
    fn broadcast_update(&self) {
        let msg = ServerMessage::match_update(self.state.id().clone(), self.state.views());
        fan_out(self.outboxes.iter().map(|(id, tx)| (id, tx)), &msg);
    }

    /// Reports the teardown to the lobby, rejects queued commands, then notifies.
    async fn close(mut self, teardown: Teardown) {
        let match_id = self.state.id().clone();

        let outcome = match &teardown {
            Teardown::Launched(payload) => MatchOutcome::Launched(payload.clone()),
            Teardown::Aborted { disconnected } => MatchOutcome::Aborted {
                disconnected: disconnected.clone(),
            },
        };

        let report = MatchReport {
            match_id: match_id.clone(),
            members: self.state.member_ids(),
            outcome,
        };
        if self.reports.send(report).await.is_err() {
            warn!(match_id = %match_id, "Lobby gone, match report dropped");
        }

        // Anything already queued for this match is answered as not found
        self.receiver.close();
        while let Ok(cmd) = self.receiver.try_recv() {
            cmd.reject(LobbyError::MatchNotFound(match_id.clone()));
        }

        match teardown {
            Teardown::Launched(payload) => {
                let delivered = fan_out(
                    self.outboxes.iter().map(|(id, tx)| (id, tx)),
                    &ServerMessage::launch(payload),
                );
                info!(match_id = %match_id, delivered, "Match launched");
            }
            Teardown::Aborted { disconnected } => {
                let msg = ServerMessage::peer_disconnected(match_id.clone(), disconnected.clone());
                let delivered = fan_out(
                    self.outboxes
                        .iter()
                        .filter(|(id, _)| *id != disconnected)
                        .map(|(id, tx)| (id, tx)),
                    &msg,
                );
                info!(
                    match_id = %match_id,
                    disconnected = %disconnected,
                    delivered,
                    "Match aborted"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{outbox, OutboxReceiver};
    use huddle_core::{Color, MatchPhase, NegotiationError, NegotiationPolicy};
    use tokio::sync::oneshot;

    struct Fixture {
        actor: MatchActor,
        inboxes: Vec<OutboxReceiver>,
        reports: mpsc::Receiver<MatchReport>,
        _commands: mpsc::UnboundedSender<MatchCommand>,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let ids: Vec<ConnectionId> = names.iter().map(|n| ConnectionId::new(*n)).collect();
        let state = Match::new(
            MatchId::new("m-1"),
            ids.clone(),
            ids.len(),
            NegotiationPolicy::default(),
        )
        .unwrap();

        let mut outboxes = Vec::new();
        let mut inboxes = Vec::new();
        for id in ids {
            let (tx, rx) = outbox();
            outboxes.push((id, tx));
            inboxes.push(rx);
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::channel(8);
        Fixture {
            actor: MatchActor::new(cmd_rx, state, outboxes, report_tx),
            inboxes,
            reports: report_rx,
            _commands: cmd_tx,
        }
    }

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn pick(who: &str, color: &str) -> (MatchCommand, oneshot::Receiver<Result<(), LobbyError>>) {
        let (tx, rx) = oneshot::channel();
        (
            MatchCommand::PickColor {
                connection_id: id(who),
                color: Color::parse(color).unwrap(),
                respond_to: tx,
            },
            rx,
        )
    }

    fn ready(who: &str, ready: bool) -> (MatchCommand, oneshot::Receiver<Result<(), LobbyError>>) {
        let (tx, rx) = oneshot::channel();
        (
            MatchCommand::SetReady {
                connection_id: id(who),
                ready,
                respond_to: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_pick_color_broadcasts_update_to_all() {
        let mut f = fixture(&["a", "b"]);

        let (cmd, rx) = pick("a", "red");
        assert!(f.actor.handle_command(cmd).is_none());
        assert!(rx.await.unwrap().is_ok());

        for inbox in &mut f.inboxes {
            match inbox.try_recv().unwrap() {
                ServerMessage::MatchUpdate { participants, .. } => {
                    assert_eq!(participants.len(), 2);
                    assert_eq!(
                        participants.first().and_then(|p| p.color.clone()),
                        Some(Color::parse("red").unwrap())
                    );
                }
                other => panic!("Expected MatchUpdate, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_pick_sends_nothing() {
        let mut f = fixture(&["a", "b"]);

        let (cmd, _rx) = pick("a", "red");
        f.actor.handle_command(cmd);
        for inbox in &mut f.inboxes {
            inbox.try_recv().unwrap();
        }

        let (cmd, rx) = pick("b", "red");
        assert!(f.actor.handle_command(cmd).is_none());
        assert!(matches!(
            rx.await.unwrap(),
            Err(LobbyError::Rejected(NegotiationError::ColorTaken { .. }))
        ));

        for inbox in &mut f.inboxes {
            assert!(inbox.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_last_ready_triggers_launch() {
        let mut f = fixture(&["a", "b"]);

        for (who, color) in [("a", "red"), ("b", "blue")] {
            let (cmd, _rx) = pick(who, color);
            assert!(f.actor.handle_command(cmd).is_none());
        }
        let (cmd, _rx) = ready("a", true);
        assert!(f.actor.handle_command(cmd).is_none());

        let (cmd, rx) = ready("b", true);
        let teardown = f.actor.handle_command(cmd);
        assert!(rx.await.unwrap().is_ok());
        assert!(matches!(teardown, Some(Teardown::Launched(_))));
        assert_eq!(f.actor.state.phase(), MatchPhase::Launched);
    }

    #[tokio::test]
    async fn test_close_reports_before_launch_notification() {
        let mut f = fixture(&["a", "b"]);
        for (who, color) in [("a", "red"), ("b", "blue")] {
            let (cmd, _rx) = pick(who, color);
            f.actor.handle_command(cmd);
            let (cmd, _rx) = ready(who, true);
            if let Some(teardown) = f.actor.handle_command(cmd) {
                f.actor.close(teardown).await;
                break;
            }
        }

        let report = f.reports.try_recv().unwrap();
        assert_eq!(report.members, vec![id("a"), id("b")]);
        assert!(matches!(report.outcome, MatchOutcome::Launched(_)));

        for inbox in &mut f.inboxes {
            let mut launches = 0;
            while let Ok(msg) = inbox.try_recv() {
                if matches!(msg, ServerMessage::Launch(_)) {
                    launches += 1;
                }
            }
            assert_eq!(launches, 1);
        }
    }

    #[tokio::test]
    async fn test_disconnect_notifies_only_others() {
        let mut f = fixture(&["a", "b", "c"]);

        let teardown = f
            .actor
            .handle_command(MatchCommand::Disconnect {
                connection_id: id("b"),
            })
            .unwrap();
        f.actor.close(teardown).await;

        let report = f.reports.try_recv().unwrap();
        assert!(matches!(
            report.outcome,
            MatchOutcome::Aborted { ref disconnected } if disconnected == &id("b")
        ));

        let mut inboxes = f.inboxes.into_iter();
        let (mut a, mut b, mut c) = (
            inboxes.next().unwrap(),
            inboxes.next().unwrap(),
            inboxes.next().unwrap(),
        );
        for inbox in [&mut a, &mut c] {
            assert_eq!(
                inbox.try_recv().unwrap(),
                ServerMessage::peer_disconnected(MatchId::new("m-1"), id("b"))
            );
            assert!(inbox.try_recv().is_err());
        }
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_of_stranger_is_ignored() {
        let mut f = fixture(&["a", "b"]);
        let teardown = f.actor.handle_command(MatchCommand::Disconnect {
            connection_id: id("zed"),
        });
        assert!(teardown.is_none());
    }
}
