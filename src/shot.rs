//! Shot resolution: the turn state machine of a session.

use std::time::SystemTime;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::board::Impact;
use crate::error::GameError;
use crate::events::{Broadcaster, GameEvent};
use crate::registry::SessionRegistry;
use crate::session::{ConnectionId, Session, SessionId, SessionState};
use crate::ship::Coord;

/// Immutable outcome of one processed shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotResult {
    pub coord: Coord,
    pub hit: bool,
    pub ship_sunk: bool,
    pub sunk_ship_name: Option<String>,
    pub game_over: bool,
    pub shooter: ConnectionId,
    /// Who fires next. Unchanged after a hit.
    pub next_turn: ConnectionId,
}

/// A [`ShotResult`] together with the participants it concerned.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: ShotResult,
    pub shooter_name: String,
    pub opponent: ConnectionId,
    pub opponent_name: String,
}

impl Session {
    /// Validate and apply a shot by `actor` at `target`.
    ///
    /// All checks run before the first write, so an error leaves the session
    /// untouched.
    pub fn fire(&mut self, actor: ConnectionId, target: Coord) -> Result<Resolution, GameError> {
        if self.retired {
            return Err(GameError::NotFound);
        }
        let shooter_slot = self.slot_of(actor).ok_or(GameError::NotParticipant)?;
        if self.state != SessionState::Playing {
            return Err(GameError::InvalidState);
        }
        if !target.in_bounds() {
            return Err(GameError::OutOfBounds);
        }
        if self.current_turn != Some(actor) {
            return Err(GameError::NotYourTurn);
        }

        let [first, second] = &mut self.players;
        let (shooter, opponent) = match shooter_slot {
            0 => (first.as_mut(), second.as_mut()),
            _ => (second.as_mut(), first.as_mut()),
        };
        let (Some(shooter), Some(opponent)) = (shooter, opponent) else {
            return Err(GameError::InvalidState);
        };
        match opponent.board.cell(target) {
            Some(state) if state.is_resolved() => return Err(GameError::AlreadyTargeted),
            Some(_) => {}
            None => return Err(GameError::OutOfBounds),
        }

        let impact = opponent.board.strike(target)?;
        shooter.stats.shots_fired += 1;

        let mut sunk_ship_name = None;
        let mut game_over = false;
        let next_turn = match impact {
            Impact::Miss => opponent.id,
            Impact::Hit => {
                shooter.stats.shots_hit += 1;
                shooter.id
            }
            Impact::Sunk(name) => {
                shooter.stats.shots_hit += 1;
                shooter.stats.ships_sunk += 1;
                sunk_ship_name = Some(name.to_string());
                game_over = opponent.board.all_sunk();
                shooter.id
            }
        };

        let resolution = Resolution {
            result: ShotResult {
                coord: target,
                hit: impact != Impact::Miss,
                ship_sunk: sunk_ship_name.is_some(),
                sunk_ship_name,
                game_over,
                shooter: shooter.id,
                next_turn,
            },
            shooter_name: shooter.name.clone(),
            opponent: opponent.id,
            opponent_name: opponent.name.clone(),
        };

        self.current_turn = Some(next_turn);
        if game_over {
            self.state = SessionState::GameOver;
            self.winner = Some(actor);
            self.ended_at = Some(SystemTime::now());
            info!(
                "session {}: {} sank the last ship of {}",
                self.id, resolution.shooter_name, resolution.opponent_name
            );
        }
        debug!(
            "session {}: {} fired at {} -> hit={} sunk={:?}",
            self.id,
            actor,
            target,
            resolution.result.hit,
            resolution.result.sunk_ship_name
        );
        Ok(resolution)
    }
}

/// Resolve a shot against a registered session while holding its guard.
///
/// The registry lookup releases the structural lock before the guard is
/// awaited; the guard is then held from validation through the turn switch.
/// Events are published before the guard is released, so observers see the
/// shots of a session in the order they were processed.
pub async fn process_shot(
    registry: &SessionRegistry,
    events: &dyn Broadcaster,
    actor: ConnectionId,
    session_id: SessionId,
    target: Coord,
) -> Result<Resolution, GameError> {
    let handle = registry.get_session(session_id).ok_or(GameError::NotFound)?;
    let mut session = handle.lock().await;
    let resolution = session.fire(actor, target)?;
    events.publish(session_id, GameEvent::ShotFired(resolution.result.clone()));
    if resolution.result.game_over {
        events.publish(
            session_id,
            GameEvent::GameOver {
                winner: actor,
                winner_name: resolution.shooter_name.clone(),
            },
        );
    }
    Ok(resolution)
}
