//! Wire messages between a client and the game server.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GameError};
use crate::events::SessionEvent;
use crate::session::{ConnectionId, SessionId, SessionView};
use crate::ship::ShipPlacement;
use crate::shot::ShotResult;

/// Bumped whenever [`Message`] changes shape.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    // Client to server.
    /// First message on every connection.
    Hello { version: u32, name: String },
    JoinMatchmaking,
    CancelMatchmaking,
    PlayAi,
    /// `None` keeps the randomly dealt fleet.
    PlaceShips { placements: Option<Vec<ShipPlacement>> },
    FireShot { x: u8, y: u8 },
    Status,

    // Server to client.
    Welcome { version: u32, connection: ConnectionId },
    Waiting,
    SessionFound { session_id: SessionId },
    /// Ship placement finished and play has begun.
    Ready,
    ShotAccepted(ShotResult),
    Event(SessionEvent),
    StatusReport(Box<SessionView>),
    Error { kind: ErrorKind, message: String },
    /// Generic acknowledgement.
    Ack,
}

impl Message {
    pub fn error(err: &GameError) -> Self {
        Message::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Message::Error {
            kind: ErrorKind::Protocol,
            message: message.into(),
        }
    }
}
