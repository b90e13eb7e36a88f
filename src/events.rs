//! Domain events and the group-broadcast primitive they are published to.

use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::{ConnectionId, SessionId};
use crate::shot::ShotResult;

/// A seated player as announced to the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: ConnectionId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    MatchFound { players: Vec<PlayerSummary> },
    ShipsPlaced { player: ConnectionId },
    GameStarted { first_turn: ConnectionId },
    ShotFired(ShotResult),
    GameOver { winner: ConnectionId, winner_name: String },
    PlayerLeft { player: ConnectionId },
    SessionClosed,
}

/// An event addressed to every participant of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub event: GameEvent,
}

/// Fan-out to "all participants of session S". Must never block the caller.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, session_id: SessionId, event: GameEvent);
}

/// In-process bus; transports subscribe and filter by session.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Broadcaster for EventBus {
    fn publish(&self, session_id: SessionId, event: GameEvent) {
        trace!("session {}: publishing {:?}", session_id, event);
        // No subscribers is not an error: nobody is listening yet.
        let _ = self.sender.send(SessionEvent { session_id, event });
    }
}
