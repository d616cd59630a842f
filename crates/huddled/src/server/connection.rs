//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs the `connect` handshake and obtains a domain `ConnectionId`
//! - Parses incoming intents and routes them to the lobby
//! - Owns a writer task that drains the connection's outbox to the socket
//! - Reports the disconnect to the lobby when the stream ends
//!
//! All outbound traffic, handshake replies included, goes through the outbox
//! so the socket has a single writer.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huddle_core::{ConnectionId, MatchId, MatchSnapshot};
use huddle_protocol::{ClientMessage, MessageType, ProtocolVersion, ServerMessage};

use crate::broadcast::{outbox, Outbox, OutboxReceiver};
use crate::lobby::{LobbyError, LobbyHandle};

/// Maximum message size (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Time allowed between accept and the `connect` message
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
///
/// Generic over the stream halves; the server uses the halves of a
/// `TcpStream`.
pub struct ConnectionHandler<R> {
    /// Buffered reader for incoming messages
    reader: BufReader<R>,

    /// Sending side of this connection's outbox
    outbox: Outbox,

    /// Drains the outbox to the socket
    writer_task: JoinHandle<()>,

    /// Handle to the lobby
    lobby: LobbyHandle,

    /// Domain identity (assigned after handshake)
    connection_id: Option<ConnectionId>,

    /// Remote address, for logging only
    peer: SocketAddr,

    /// Stops this connection's reader and writer
    cancel: CancellationToken,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a handler and starts its writer task.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the stream
    /// * `writer` - Write half of the stream
    /// * `peer` - Remote address
    /// * `lobby` - Handle to the lobby
    /// * `cancel` - Token cancelled on server shutdown or writer failure
    pub fn new<W>(
        reader: R,
        writer: W,
        peer: SocketAddr,
        lobby: LobbyHandle,
        cancel: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = outbox();
        let writer_task = tokio::spawn(write_loop(
            BufWriter::new(writer),
            rx,
            cancel.clone(),
            peer,
        ));

        Self {
            reader: BufReader::new(reader),
            outbox: tx,
            writer_task,
            lobby,
            connection_id: None,
            peer,
            cancel,
        }
    }

    /// Runs the connection handler until the client goes away.
    pub async fn run(mut self) {
        debug!(peer = %self.peer, "New client connected");

        if let Err(e) = self.handle_handshake().await {
            warn!(peer = %self.peer, error = %e, "Handshake failed");
            self.release_registration().await;
            self.finish_rejected().await;
            return;
        }

        info!(
            peer = %self.peer,
            connection_id = ?self.connection_id,
            "Client handshake completed"
        );

        if let Err(e) = self.process_messages().await {
            debug!(
                connection_id = ?self.connection_id,
                error = %e,
                "Connection closed"
            );
        }

        self.release_registration().await;

        // Match actors may still hold outbox clones, so the writer is stopped explicitly
        self.cancel.cancel();
        let _ = self.writer_task.await;
    }

    /// Reports the disconnect for a registered id, at most once.
    async fn release_registration(&mut self) {
        if let Some(id) = self.connection_id.take() {
            if let Err(e) = self.lobby.disconnect(&id).await {
                debug!(connection_id = %id, error = %e, "Lobby gone before disconnect");
            }
            info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Lets the writer flush a `rejected`/`error` reply, then closes.
    async fn finish_rejected(self) {
        let Self {
            outbox,
            writer_task,
            ..
        } = self;
        drop(outbox);
        let _ = writer_task.await;
    }

    /// Handles the initial `connect` handshake.
    ///
    /// Validates the protocol version, registers with the lobby, and answers
    /// with `connected` or `rejected`. Only the read is bounded by
    /// `HANDSHAKE_TIMEOUT`; once `Connect` reaches the lobby its reply is
    /// always awaited so a registered id is never orphaned.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let cancel = self.cancel.clone();
        let read = tokio::select! {
            _ = cancel.cancelled() => Err(ConnectionError::Shutdown),
            result = timeout(HANDSHAKE_TIMEOUT, self.read_message()) => {
                result.unwrap_or(Err(ConnectionError::Timeout))
            }
        };

        let msg = match read {
            Ok(msg) => msg,
            Err(e @ (ConnectionError::ParseError(_) | ConnectionError::MessageTooLarge { .. })) => {
                self.send_message(ServerMessage::error(&e.to_string()))?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let client_version = msg.protocol_version;
        if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );

            self.send_message(ServerMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                client_version,
                ProtocolVersion::CURRENT
            )))?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let proposed = client_id
                    .filter(|id| !id.trim().is_empty())
                    .map(ConnectionId::from);

                match self.lobby.connect(proposed, self.outbox.clone()).await {
                    Ok(id) => {
                        self.connection_id = Some(id.clone());
                        self.send_message(ServerMessage::connected(id))
                    }
                    Err(LobbyError::ConnectionAlreadyExists(id)) => {
                        self.send_message(ServerMessage::rejected(&format!(
                            "Connection id {id} is already in use"
                        )))?;
                        Err(ConnectionError::Lobby(LobbyError::ConnectionAlreadyExists(id)))
                    }
                    Err(e) => Err(ConnectionError::Lobby(e)),
                }
            }
            other => {
                self.send_message(ServerMessage::error(
                    "Expected connect message for handshake",
                ))?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    /// Main message processing loop.
    ///
    /// Reads and processes messages until the connection closes, the client
    /// sends `disconnect`, or the server shuts down. Malformed lines are
    /// answered with `error` and the loop continues.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        let cancel = self.cancel.clone();
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = self.read_message() => read,
            };

            let msg = match read {
                Ok(msg) => msg,
                Err(ConnectionError::Eof) => {
                    debug!(connection_id = ?self.connection_id, "Client sent EOF");
                    return Ok(());
                }
                Err(e @ (ConnectionError::ParseError(_) | ConnectionError::MessageTooLarge { .. })) => {
                    debug!(
                        connection_id = ?self.connection_id,
                        error = %e,
                        "Malformed message"
                    );
                    self.send_message(ServerMessage::error(&e.to_string()))?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Handles a single client message.
    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let connection_id = match &self.connection_id {
            Some(id) => id.clone(),
            None => return Err(ConnectionError::UnexpectedMessage("not connected".to_string())),
        };

        match msg.message {
            MessageType::Connect { .. } => {
                self.send_message(ServerMessage::error("Already connected"))?;
            }

            MessageType::JoinQueue => {
                let result = self.lobby.join_queue(&connection_id).await;
                absorb(&connection_id, "join-queue", result)?;
            }

            MessageType::LeaveQueue => {
                let result = self.lobby.leave_queue(&connection_id).await;
                absorb(&connection_id, "leave-queue", result)?;
            }

            MessageType::PickColor { match_id, color } => {
                let result = self.lobby.pick_color(&connection_id, &match_id, color).await;
                absorb(&connection_id, "pick-color", result)?;
            }

            MessageType::SetReady { match_id, ready } => {
                let result = self.lobby.set_ready(&connection_id, &match_id, ready).await;
                absorb(&connection_id, "set-ready", result)?;
            }

            MessageType::GetMatch { match_id } => {
                let snapshot = self.lookup_match(&connection_id, match_id).await;
                self.send_message(ServerMessage::match_state(snapshot))?;
            }

            MessageType::Ping { seq } => {
                self.send_message(ServerMessage::pong(seq))?;
            }

            MessageType::Disconnect => {
                debug!(connection_id = %connection_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        }

        Ok(())
    }

    async fn lookup_match(
        &self,
        connection_id: &ConnectionId,
        match_id: Option<MatchId>,
    ) -> Option<MatchSnapshot> {
        match match_id {
            Some(id) => self.lobby.get_match(&id).await,
            None => self.lobby.match_of(connection_id).await,
        }
    }

    /// Reads a single newline-delimited message from the client.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_str(line.trim_end())
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            connection_id = ?self.connection_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    /// Queues a message for the writer task.
    fn send_message(&self, msg: ServerMessage) -> Result<(), ConnectionError> {
        self.outbox
            .send(msg)
            .map_err(|_| ConnectionError::WriterClosed)
    }
}

/// Logs a lobby rejection and keeps the connection open.
///
/// Only a closed lobby ends the connection; every other rejection is
/// expected and invisible to the client.
fn absorb(
    connection_id: &ConnectionId,
    intent: &'static str,
    result: Result<(), LobbyError>,
) -> Result<(), ConnectionError> {
    match result {
        Ok(()) => Ok(()),
        Err(LobbyError::ChannelClosed) => Err(ConnectionError::Lobby(LobbyError::ChannelClosed)),
        Err(e) => {
            debug!(
                connection_id = %connection_id,
                intent,
                reason = %e,
                "Intent had no effect"
            );
            Ok(())
        }
    }
}

/// Drains an outbox to the socket until it closes or the token is cancelled.
///
/// A failed write cancels the token, which ends the reader and sends the
/// connection down the disconnect path.
async fn write_loop<W>(
    mut writer: BufWriter<W>,
    mut outbox: OutboxReceiver,
    cancel: CancellationToken,
    peer: SocketAddr,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            msg = outbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        if let Err(e) = write_message(&mut writer, &msg).await {
            debug!(peer = %peer, error = %e, "Write failed, closing connection");
            cancel.cancel();
            return;
        }
    }

    let _ = writer.shutdown().await;
}

/// Writes one JSON line and flushes it.
async fn write_message<W>(
    writer: &mut BufWriter<W>,
    msg: &ServerMessage,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Handshake timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Writer task stopped")]
    WriterClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Lobby error: {0}")]
    Lobby(#[from] LobbyError),
}
