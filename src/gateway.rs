//! Per-connection driver: speaks [`Message`]s over a [`Transport`] and
//! forwards them to the [`GameServer`].

use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::events::SessionEvent;
use crate::protocol::{Message, PROTOCOL_VERSION};
use crate::server::{GameServer, JoinOutcome};
use crate::session::{ConnectionId, SessionId};
use crate::transport::Transport;

enum Inbound {
    Request(anyhow::Result<Message>),
    Reply(Message),
    Event(Result<SessionEvent, RecvError>),
}

pub struct Gateway {
    server: Arc<GameServer>,
    transport: Box<dyn Transport>,
    events: broadcast::Receiver<SessionEvent>,
    session: Option<SessionId>,
}

impl Gateway {
    pub fn new(
        server: Arc<GameServer>,
        transport: Box<dyn Transport>,
        events: broadcast::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            server,
            transport,
            events,
            session: None,
        }
    }

    /// Expect `Hello` with a matching protocol version. Returns the player name.
    async fn handshake(&mut self) -> anyhow::Result<String> {
        match self.transport.recv().await? {
            Message::Hello { version, name } if version == PROTOCOL_VERSION => Ok(name),
            Message::Hello { version, .. } => {
                warn!(
                    "handshake version mismatch: expected {}, client sent {}",
                    PROTOCOL_VERSION, version
                );
                let _ = self
                    .transport
                    .send(Message::protocol_error(format!(
                        "unsupported protocol version {}, server speaks {}",
                        version, PROTOCOL_VERSION
                    )))
                    .await;
                Err(anyhow!(
                    "protocol version mismatch: expected {}, got {}",
                    PROTOCOL_VERSION,
                    version
                ))
            }
            other => {
                warn!("expected Hello, got {:?}", other);
                let _ = self
                    .transport
                    .send(Message::protocol_error("expected Hello"))
                    .await;
                Err(anyhow!("expected Hello, got unexpected message (closing connection)"))
            }
        }
    }

    /// Drive the connection until the client goes away. The connection is
    /// always detached from the server before this returns.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let name = self.handshake().await?;
        let conn = self.server.connect();
        self.transport
            .send(Message::Welcome {
                version: PROTOCOL_VERSION,
                connection: conn,
            })
            .await?;
        info!("{} connected as {}", name, conn);

        let result = self.serve(conn, &name).await;
        self.server.on_disconnect(conn).await;
        info!("{} ({}) disconnected", name, conn);
        result
    }

    async fn serve(&mut self, conn: ConnectionId, name: &str) -> anyhow::Result<()> {
        let (outbox, mut replies) = mpsc::unbounded_channel();
        let mut events_open = true;
        loop {
            let next = tokio::select! {
                request = self.transport.recv() => Inbound::Request(request),
                Some(reply) = replies.recv() => Inbound::Reply(reply),
                event = self.events.recv(), if events_open => Inbound::Event(event),
            };
            match next {
                Inbound::Request(Ok(request)) => {
                    if let Some(reply) = self.handle(conn, name, request, &outbox).await {
                        self.transport.send(reply).await?;
                    }
                }
                Inbound::Request(Err(e)) => {
                    debug!("{}: transport closed: {:#}", conn, e);
                    return Ok(());
                }
                Inbound::Reply(reply) => self.transport.send(reply).await?,
                Inbound::Event(Ok(event)) => {
                    if self.follows(conn, event.session_id) {
                        self.transport.send(Message::Event(event)).await?;
                    }
                }
                Inbound::Event(Err(RecvError::Lagged(missed))) => {
                    warn!("{}: event stream lagged, {} events missed", conn, missed);
                }
                Inbound::Event(Err(RecvError::Closed)) => events_open = false,
            }
        }
    }

    /// Whether events of `session_id` belong to this connection.
    fn follows(&mut self, conn: ConnectionId, session_id: SessionId) -> bool {
        if self.session != Some(session_id) {
            self.session = self.server.registry().session_for_connection(conn);
        }
        self.session == Some(session_id)
    }

    async fn handle(
        &mut self,
        conn: ConnectionId,
        name: &str,
        request: Message,
        outbox: &mpsc::UnboundedSender<Message>,
    ) -> Option<Message> {
        let reply = match request {
            Message::JoinMatchmaking => match self.server.join_matchmaking(conn, name).await {
                Ok(JoinOutcome::Waiting) => {
                    self.session = None;
                    Message::Waiting
                }
                Ok(JoinOutcome::SessionFound(session_id)) => {
                    self.session = Some(session_id);
                    Message::SessionFound { session_id }
                }
                Err(e) => Message::error(&e),
            },
            Message::CancelMatchmaking => {
                self.server.cancel_matchmaking(conn).await;
                Message::Ack
            }
            Message::PlayAi => match self.server.play_against_ai(conn, name).await {
                Ok(session_id) => {
                    self.session = Some(session_id);
                    Message::SessionFound { session_id }
                }
                Err(e) => Message::error(&e),
            },
            Message::PlaceShips { placements } => {
                // Placement waits on the other player; keep serving meanwhile.
                let server = Arc::clone(&self.server);
                let outbox = outbox.clone();
                tokio::spawn(async move {
                    let reply = match server.place_ships(conn, placements).await {
                        Ok(()) => Message::Ready,
                        Err(e) => Message::error(&e),
                    };
                    let _ = outbox.send(reply);
                });
                return None;
            }
            Message::FireShot { x, y } => match self.server.fire_shot(conn, x, y).await {
                Ok(result) => Message::ShotAccepted(result),
                Err(e) => Message::error(&e),
            },
            Message::Status => match self.server.session_view(conn).await {
                Ok(view) => Message::StatusReport(Box::new(view)),
                Err(e) => Message::error(&e),
            },
            other => {
                debug!("{}: unexpected client message {:?}", conn, other);
                Message::protocol_error("unexpected message")
            }
        };
        Some(reply)
    }
}
