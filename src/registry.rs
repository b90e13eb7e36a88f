//! Session registry: who is in which session, and the per-session guards.
//!
//! Two lock scopes exist. The structural lock (`parking_lot::RwLock`) covers
//! the id maps and is only ever held for a few synchronous map operations.
//! Each session has its own async guard. The structural lock is always
//! released before a session guard is awaited, so lookups never wait behind a
//! slow session and unrelated sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::Mutex;

use crate::board::Board;
use crate::error::GameError;
use crate::session::{ConnectionId, Player, PlayerKind, Session, SessionId};

/// Shared handle to a session; locking it acquires the session guard.
pub type SessionHandle = Arc<Mutex<Session>>;

/// A connection about to be seated in a new session.
#[derive(Debug, Clone)]
pub struct Seat {
    pub id: ConnectionId,
    pub name: String,
    pub kind: PlayerKind,
}

impl Seat {
    pub fn human(id: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: PlayerKind::Human,
        }
    }

    pub fn ai(id: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: PlayerKind::Ai,
        }
    }
}

/// Outcome of detaching a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    pub session_id: SessionId,
    /// The session lost its last human and was removed.
    pub retired: bool,
}

#[derive(Default)]
struct Maps {
    sessions: HashMap<SessionId, SessionHandle>,
    connections: HashMap<ConnectionId, SessionId>,
}

#[derive(Default)]
pub struct SessionRegistry {
    maps: RwLock<Maps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for two connections, each with a random fleet.
    ///
    /// The session and both connection mappings become visible in a single
    /// structural write, so a lookup by either connection sees all or nothing.
    pub fn create_session(
        &self,
        first: Seat,
        second: Seat,
    ) -> Result<(SessionId, SessionHandle), GameError> {
        if first.id == second.id {
            return Err(GameError::InvalidState);
        }
        let mut rng = SmallRng::from_rng(&mut rand::rng());
        let id = SessionId::new();
        let mut session = Session::new(id);
        for seat in [first, second] {
            let board = Board::random(&mut rng)?;
            session.seat(Player::new(seat.id, seat.name, seat.kind, board))?;
        }
        let members: Vec<ConnectionId> = session.players().map(|p| p.id()).collect();
        let handle = Arc::new(Mutex::new(session));

        let mut maps = self.maps.write();
        if members.iter().any(|c| maps.connections.contains_key(c)) {
            return Err(GameError::InvalidState);
        }
        for conn in members.iter() {
            maps.connections.insert(*conn, id);
        }
        maps.sessions.insert(id, Arc::clone(&handle));
        drop(maps);

        info!("session {} created for {:?}", id, members);
        Ok((id, handle))
    }

    pub fn get_session(&self, id: SessionId) -> Option<SessionHandle> {
        self.maps.read().sessions.get(&id).cloned()
    }

    pub fn session_for_connection(&self, conn: ConnectionId) -> Option<SessionId> {
        self.maps.read().connections.get(&conn).copied()
    }

    /// Detach `conn` from its session. When no human player is left attached
    /// the session is retired and dropped from the registry.
    pub async fn remove_connection(&self, conn: ConnectionId) -> Option<Detached> {
        let (session_id, handle) = {
            let mut maps = self.maps.write();
            let session_id = maps.connections.remove(&conn)?;
            (session_id, maps.sessions.get(&session_id).cloned())
        };
        let Some(handle) = handle else {
            return Some(Detached {
                session_id,
                retired: true,
            });
        };

        let retired = handle.lock().await.detach(conn);
        debug!("{} detached from session {}", conn, session_id);
        if retired {
            let mut maps = self.maps.write();
            if maps
                .sessions
                .get(&session_id)
                .is_some_and(|h| Arc::ptr_eq(h, &handle))
            {
                maps.sessions.remove(&session_id);
            }
            maps.connections.retain(|_, sid| *sid != session_id);
            drop(maps);
            info!("session {} retired", session_id);
        }
        Some(Detached {
            session_id,
            retired,
        })
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.maps.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.maps.read().sessions.keys().copied().collect()
    }
}
