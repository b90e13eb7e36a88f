//! The game server: connection-facing operations over the registry,
//! matchmaking, barriers and the background dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::ai;
use crate::barrier::ReadinessBarriers;
use crate::board::Board;
use crate::config::ServerConfig;
use crate::dispatch::handlers::{
    AiMoveHandler, AiTurn, AnalyticsRecorder, Leaderboard, MatchOutcome, ShotAnalytics,
};
use crate::dispatch::{DispatchStats, Dispatcher, DispatcherConfig, JobHandlers, JobKind};
use crate::error::GameError;
use crate::events::{Broadcaster, GameEvent, PlayerSummary};
use crate::matchmaking::MatchmakingQueue;
use crate::registry::{Seat, SessionHandle, SessionRegistry};
use crate::session::{ConnectionId, SessionId, SessionState, SessionView};
use crate::ship::{Coord, ShipPlacement};
use crate::shot::{process_shot, Resolution, ShotResult};

/// Display name of the server-side opponent.
pub const AI_NAME: &str = "Admiral Bot";

/// Result of asking to be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOutcome {
    Waiting,
    SessionFound(SessionId),
}

pub struct GameServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    matchmaking: MatchmakingQueue,
    barriers: ReadinessBarriers,
    dispatcher: Dispatcher,
    events: Arc<dyn Broadcaster>,
    analytics: Arc<AnalyticsRecorder>,
    leaderboard: Arc<Leaderboard>,
    ai_players: Mutex<HashMap<ConnectionId, SessionId>>,
    next_connection: AtomicU64,
}

impl GameServer {
    /// Build the server and spawn its dispatch workers on the current runtime.
    pub fn start(config: ServerConfig, events: Arc<dyn Broadcaster>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let analytics = Arc::new(AnalyticsRecorder::new());
        let leaderboard = Arc::new(Leaderboard::new());

        Arc::new_cyclic(|server| {
            let handlers = JobHandlers {
                ai_move: Arc::new(AiMoveHandler::new(server.clone())),
                analytics: analytics.clone(),
                leaderboard: leaderboard.clone(),
            };
            Self {
                dispatcher: Dispatcher::start(DispatcherConfig::from(&config), handlers),
                matchmaking: MatchmakingQueue::new(Arc::clone(&registry)),
                barriers: ReadinessBarriers::new(),
                registry,
                events,
                analytics,
                leaderboard,
                ai_players: Mutex::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
                config,
            }
        })
    }

    /// Hand out a fresh connection identity.
    pub fn connect(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn join_matchmaking(
        &self,
        conn: ConnectionId,
        name: impl Into<String>,
    ) -> Result<JoinOutcome, GameError> {
        self.leave_finished_session(conn).await?;
        match self.matchmaking.join(conn, name).await? {
            Some(session_id) => {
                self.announce_match(session_id).await;
                Ok(JoinOutcome::SessionFound(session_id))
            }
            None => Ok(JoinOutcome::Waiting),
        }
    }

    pub async fn cancel_matchmaking(&self, conn: ConnectionId) -> bool {
        self.matchmaking.cancel(conn).await
    }

    /// Seat `conn` against a server-side AI with a random fleet.
    pub async fn play_against_ai(
        &self,
        conn: ConnectionId,
        name: impl Into<String>,
    ) -> Result<SessionId, GameError> {
        self.leave_finished_session(conn).await?;
        self.matchmaking.cancel(conn).await;
        let ai = self.connect();
        let (session_id, _) = self
            .registry
            .create_session(Seat::human(conn, name), Seat::ai(ai, AI_NAME))?;
        self.ai_players.lock().insert(ai, session_id);
        info!("{} playing against {} in session {}", conn, ai, session_id);
        self.announce_match(session_id).await;
        Ok(session_id)
    }

    /// Lock in a fleet and wait for the other human player to do the same.
    ///
    /// `None` keeps the fleet the player was dealt. Resolves once play has
    /// begun, or fails with [`GameError::ReadinessTimeout`].
    pub async fn place_ships(
        &self,
        conn: ConnectionId,
        placements: Option<Vec<ShipPlacement>>,
    ) -> Result<(), GameError> {
        let (session_id, handle) = self.session_of(conn)?;
        let expected = {
            let mut session = handle.lock().await;
            match placements {
                Some(layout) => {
                    session.check_placing(conn)?;
                    let board = Board::from_placements(&layout)?;
                    session.install_board(conn, board)?;
                }
                None => session.mark_ready(conn)?,
            }
            self.events
                .publish(session_id, GameEvent::ShipsPlaced { player: conn });
            session.human_count()
        };

        let waited = self
            .barriers
            .await_all_ready(session_id, conn, expected, self.config.readiness_timeout)
            .await;
        if let Err(e) = waited {
            handle.lock().await.clear_ready(conn);
            return Err(e);
        }

        let opener = {
            let mut session = handle.lock().await;
            if !session.begin_play()? {
                return Ok(());
            }
            let first_turn = session.current_turn().ok_or(GameError::InvalidState)?;
            info!("session {}: play begins, {} opens", session_id, first_turn);
            self.events
                .publish(session_id, GameEvent::GameStarted { first_turn });
            first_turn
        };
        if self.is_ai(opener) {
            self.schedule_ai(session_id, opener);
        }
        Ok(())
    }

    pub async fn fire_shot(&self, conn: ConnectionId, x: u8, y: u8) -> Result<ShotResult, GameError> {
        let session_id = self
            .registry
            .session_for_connection(conn)
            .ok_or(GameError::NotFound)?;
        let resolution = process_shot(
            &self.registry,
            self.events.as_ref(),
            conn,
            session_id,
            Coord::new(x, y),
        )
        .await?;
        self.after_shot(session_id, &resolution);
        Ok(resolution.result)
    }

    /// Take the AI's turn if it still holds it. A turn that moved on since
    /// the job was queued is a no-op.
    pub async fn play_ai_turn(&self, session_id: SessionId, ai: ConnectionId) -> Result<(), GameError> {
        let handle = self
            .registry
            .get_session(session_id)
            .ok_or(GameError::NotFound)?;
        let view = {
            let session = handle.lock().await;
            if session.state() != SessionState::Playing || session.current_turn() != Some(ai) {
                debug!("session {}: stale move for {} ignored", session_id, ai);
                return Ok(());
            }
            session
                .opponent_of(ai)
                .map(|p| p.board().target_view())
                .ok_or(GameError::InvalidState)?
        };

        let target = {
            let mut rng = SmallRng::from_rng(&mut rand::rng());
            ai::choose_target(&view, &mut rng)
        };
        let resolution =
            process_shot(&self.registry, self.events.as_ref(), ai, session_id, target).await?;
        self.after_shot(session_id, &resolution);
        Ok(())
    }

    /// Forget `conn`: leave the queue, detach from its session, and close the
    /// session when no human is left.
    pub async fn on_disconnect(&self, conn: ConnectionId) {
        self.matchmaking.cancel(conn).await;
        self.detach(conn).await;
    }

    /// Release `conn` from a finished game so it can start another one. A game
    /// still in progress keeps its players.
    async fn leave_finished_session(&self, conn: ConnectionId) -> Result<(), GameError> {
        let Some(session_id) = self.registry.session_for_connection(conn) else {
            return Ok(());
        };
        if let Some(handle) = self.registry.get_session(session_id) {
            if handle.lock().await.state() != SessionState::GameOver {
                return Err(GameError::InvalidState);
            }
        }
        info!("{} leaves finished session {}", conn, session_id);
        self.detach(conn).await;
        Ok(())
    }

    async fn detach(&self, conn: ConnectionId) {
        let Some(detached) = self.registry.remove_connection(conn).await else {
            debug!("{} is not seated in any session", conn);
            return;
        };
        self.events
            .publish(detached.session_id, GameEvent::PlayerLeft { player: conn });
        if detached.retired {
            self.barriers.abort(detached.session_id);
            self.ai_players
                .lock()
                .retain(|_, session_id| *session_id != detached.session_id);
            self.events
                .publish(detached.session_id, GameEvent::SessionClosed);
        }
    }

    pub async fn session_view(&self, conn: ConnectionId) -> Result<SessionView, GameError> {
        let (_, handle) = self.session_of(conn)?;
        let session = handle.lock().await;
        session.view_for(conn)
    }

    /// Stop background work, giving running jobs the configured deadline.
    pub async fn shutdown(&self) {
        info!("game server shutting down");
        self.dispatcher.shutdown(self.config.shutdown_deadline).await;
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn matchmaking(&self) -> &MatchmakingQueue {
        &self.matchmaking
    }

    pub fn barriers(&self) -> &ReadinessBarriers {
        &self.barriers
    }

    pub fn analytics(&self) -> &AnalyticsRecorder {
        &self.analytics
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn is_ai(&self, conn: ConnectionId) -> bool {
        self.ai_players.lock().contains_key(&conn)
    }

    fn session_of(&self, conn: ConnectionId) -> Result<(SessionId, SessionHandle), GameError> {
        let session_id = self
            .registry
            .session_for_connection(conn)
            .ok_or(GameError::NotFound)?;
        let handle = self
            .registry
            .get_session(session_id)
            .ok_or(GameError::NotFound)?;
        Ok((session_id, handle))
    }

    async fn announce_match(&self, session_id: SessionId) {
        let Some(handle) = self.registry.get_session(session_id) else {
            return;
        };
        let session = handle.lock().await;
        let players = session
            .players()
            .map(|p| PlayerSummary {
                id: p.id(),
                name: p.name().to_string(),
            })
            .collect();
        self.events
            .publish(session_id, GameEvent::MatchFound { players });
    }

    fn after_shot(&self, session_id: SessionId, resolution: &Resolution) {
        let result = &resolution.result;
        self.submit(
            session_id,
            JobKind::Analytics,
            &ShotAnalytics {
                shooter: resolution.shooter_name.clone(),
                hit: result.hit,
                sunk: result.ship_sunk,
                game_over: result.game_over,
            },
        );
        if result.game_over {
            self.submit(
                session_id,
                JobKind::LeaderboardUpdate,
                &MatchOutcome {
                    winner: resolution.shooter_name.clone(),
                    loser: resolution.opponent_name.clone(),
                },
            );
        } else if self.is_ai(result.next_turn) {
            self.schedule_ai(session_id, result.next_turn);
        }
    }

    fn schedule_ai(&self, session_id: SessionId, ai: ConnectionId) {
        self.submit(session_id, JobKind::AiMove, &AiTurn { ai });
    }

    // Fire and forget: a rejected job is already logged by the dispatcher.
    fn submit<T: Serialize>(&self, session_id: SessionId, kind: JobKind, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("session {}: cannot encode {} job: {}", session_id, kind, e);
                return;
            }
        };
        let _ = self.dispatcher.submit(session_id, kind, payload);
    }
}
