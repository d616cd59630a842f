//! Broadcast router: fan-out of notifications to connection outboxes.
//!
//! Every connection owns an unbounded outbox drained by its writer task.
//! Sending never awaits, so actors can notify any number of clients right
//! after a state mutation without yielding in the middle of it.
//!
//! A closed outbox means the client is already gone; its disconnect is on
//! the way through the lobby, so delivery failures are logged and dropped.

use tokio::sync::mpsc;
use tracing::debug;

use huddle_core::ConnectionId;
use huddle_protocol::ServerMessage;

/// Sending half of a connection's outbound message queue.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Receiving half, owned by the connection's writer task.
pub type OutboxReceiver = mpsc::UnboundedReceiver<ServerMessage>;

/// Creates a new outbox pair.
pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// Sends a message to one connection. Returns false if its writer is gone.
pub fn send_to(connection_id: &ConnectionId, outbox: &Outbox, msg: ServerMessage) -> bool {
    let kind = msg.kind();
    match outbox.send(msg) {
        Ok(()) => true,
        Err(_) => {
            debug!(
                connection_id = %connection_id,
                message = kind,
                "Outbox closed, dropping message"
            );
            false
        }
    }
}

/// Sends a copy of `msg` to every recipient.
///
/// Returns the number of outboxes that accepted the message.
pub fn fan_out<'a, I>(recipients: I, msg: &ServerMessage) -> usize
where
    I: IntoIterator<Item = (&'a ConnectionId, &'a Outbox)>,
{
    recipients
        .into_iter()
        .filter(|(id, outbox)| send_to(id, outbox, msg.clone()))
        .count()
}
