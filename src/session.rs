//! Session and player data model.

use core::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{Board, CellState, TargetView};
use crate::config::{BOARD_SIZE, PLAYERS_PER_SESSION};
use crate::error::GameError;

/// Opaque session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of one client connection, handed out by the transport side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    WaitingForPlayers,
    PlacingShips,
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerKind {
    Human,
    Ai,
}

/// Cumulative per-player counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub ships_sunk: u32,
}

/// One seat in a session.
#[derive(Debug, Clone)]
pub struct Player {
    pub(crate) id: ConnectionId,
    pub(crate) name: String,
    pub(crate) kind: PlayerKind,
    pub(crate) board: Board,
    pub(crate) ready: bool,
    pub(crate) attached: bool,
    pub(crate) stats: PlayerStats,
}

impl Player {
    pub fn new(id: ConnectionId, name: impl Into<String>, kind: PlayerKind, board: Board) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            board,
            // The server-side AI never places ships interactively.
            ready: kind == PlayerKind::Ai,
            attached: true,
            stats: PlayerStats::default(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats
    }
}

/// A two-player game. Always accessed through the session guard held by the
/// registry; nothing here locks on its own.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) players: [Option<Player>; PLAYERS_PER_SESSION],
    pub(crate) state: SessionState,
    pub(crate) current_turn: Option<ConnectionId>,
    pub(crate) winner: Option<ConnectionId>,
    pub(crate) created_at: SystemTime,
    pub(crate) started_at: Option<SystemTime>,
    pub(crate) ended_at: Option<SystemTime>,
    pub(crate) retired: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            players: [None, None],
            state: SessionState::WaitingForPlayers,
            current_turn: None,
            winner: None,
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            retired: false,
        }
    }

    /// Fill the next free seat. Filling the last seat moves the session on to
    /// ship placement.
    pub fn seat(&mut self, player: Player) -> Result<(), GameError> {
        if self.state != SessionState::WaitingForPlayers {
            return Err(GameError::InvalidState);
        }
        if self.slot_of(player.id).is_some() {
            return Err(GameError::InvalidState);
        }
        let slot = self
            .players
            .iter_mut()
            .find(|p| p.is_none())
            .ok_or(GameError::InvalidState)?;
        *slot = Some(player);
        if self.players.iter().all(Option::is_some) {
            self.state = SessionState::PlacingShips;
        }
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_turn(&self) -> Option<ConnectionId> {
        self.current_turn
    }

    pub fn winner(&self) -> Option<ConnectionId> {
        self.winner
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().flatten()
    }

    pub fn player(&self, id: ConnectionId) -> Option<&Player> {
        self.players().find(|p| p.id == id)
    }

    pub(crate) fn slot_of(&self, id: ConnectionId) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.id == id))
    }

    pub(crate) fn player_mut(&mut self, id: ConnectionId) -> Option<&mut Player> {
        self.players.iter_mut().flatten().find(|p| p.id == id)
    }

    /// The other seated player.
    pub fn opponent_of(&self, id: ConnectionId) -> Option<&Player> {
        let slot = self.slot_of(id)?;
        self.players[1 - slot].as_ref()
    }

    /// Human seats, attached or not.
    pub fn human_count(&self) -> usize {
        self.players().filter(|p| p.kind == PlayerKind::Human).count()
    }

    /// Human players still connected.
    pub fn attached_humans(&self) -> usize {
        self.players()
            .filter(|p| p.kind == PlayerKind::Human && p.attached)
            .count()
    }

    /// Check that `id` may still change their fleet.
    pub fn check_placing(&self, id: ConnectionId) -> Result<(), GameError> {
        if self.retired {
            return Err(GameError::NotFound);
        }
        self.slot_of(id).ok_or(GameError::NotParticipant)?;
        if self.state != SessionState::PlacingShips {
            return Err(GameError::InvalidState);
        }
        Ok(())
    }

    /// Replace a player's board during ship placement and mark them ready.
    pub fn install_board(&mut self, id: ConnectionId, board: Board) -> Result<(), GameError> {
        self.check_placing(id)?;
        if let Some(player) = self.player_mut(id) {
            player.board = board;
            player.ready = true;
        }
        Ok(())
    }

    /// Mark a player ready with the board they already have.
    pub fn mark_ready(&mut self, id: ConnectionId) -> Result<(), GameError> {
        self.check_placing(id)?;
        if let Some(player) = self.player_mut(id) {
            player.ready = true;
        }
        Ok(())
    }

    pub(crate) fn clear_ready(&mut self, id: ConnectionId) {
        if self.state == SessionState::PlacingShips {
            if let Some(player) = self.player_mut(id) {
                player.ready = false;
            }
        }
    }

    /// Move from placement to play once every seat is ready. Player one opens.
    ///
    /// Returns `Ok(true)` for the call that performed the transition and
    /// `Ok(false)` if play had already begun.
    pub fn begin_play(&mut self) -> Result<bool, GameError> {
        if self.retired {
            return Err(GameError::NotFound);
        }
        match self.state {
            SessionState::Playing | SessionState::GameOver => Ok(false),
            SessionState::WaitingForPlayers => Err(GameError::InvalidState),
            SessionState::PlacingShips => {
                if !self.players().all(|p| p.ready) || self.players().count() < PLAYERS_PER_SESSION
                {
                    return Err(GameError::InvalidState);
                }
                self.state = SessionState::Playing;
                self.current_turn = self.players[0].as_ref().map(|p| p.id);
                self.started_at = Some(SystemTime::now());
                Ok(true)
            }
        }
    }

    /// Detach a connection. Returns `true` when no human remains attached and
    /// the session has been retired.
    pub(crate) fn detach(&mut self, id: ConnectionId) -> bool {
        if let Some(player) = self.player_mut(id) {
            player.attached = false;
        }
        if self.attached_humans() == 0 {
            self.retired = true;
        }
        self.retired
    }

    /// Snapshot for one participant.
    pub fn view_for(&self, id: ConnectionId) -> Result<SessionView, GameError> {
        let me = self.player(id).ok_or(GameError::NotParticipant)?;
        let opponent = self.opponent_of(id);
        Ok(SessionView {
            session_id: self.id,
            state: self.state,
            you: id,
            name: me.name.clone(),
            ready: me.ready,
            stats: me.stats,
            board: *me.board.cells(),
            opponent: opponent.map(|p| OpponentView {
                id: p.id,
                name: p.name.clone(),
                attached: p.attached,
                ready: p.ready,
                stats: p.stats,
            }),
            target: opponent.map(|p| p.board.target_view()),
            current_turn: self.current_turn,
            winner: self.winner,
        })
    }
}

/// Public facts about the other player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentView {
    pub id: ConnectionId,
    pub name: String,
    pub attached: bool,
    pub ready: bool,
    pub stats: PlayerStats,
}

/// What one participant may see of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub state: SessionState,
    pub you: ConnectionId,
    pub name: String,
    pub ready: bool,
    pub stats: PlayerStats,
    pub board: [[CellState; BOARD_SIZE as usize]; BOARD_SIZE as usize],
    pub opponent: Option<OpponentView>,
    pub target: Option<TargetView>,
    pub current_turn: Option<ConnectionId>,
    pub winner: Option<ConnectionId>,
}
