//! Handlers for the built-in job kinds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use anyhow::anyhow;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{BackgroundJob, JobHandler};
use crate::server::GameServer;
use crate::session::ConnectionId;

/// Payload of an `Analytics` job, one per resolved shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotAnalytics {
    pub shooter: String,
    pub hit: bool,
    pub sunk: bool,
    pub game_over: bool,
}

/// Payload of a `LeaderboardUpdate` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub winner: String,
    pub loser: String,
}

/// Payload of an `AiMove` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiTurn {
    pub ai: ConnectionId,
}

/// Aggregated gameplay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub shots: u64,
    pub hits: u64,
    pub ships_sunk: u64,
    pub games_completed: u64,
}

#[derive(Default)]
pub struct AnalyticsRecorder {
    shots: AtomicU64,
    hits: AtomicU64,
    ships_sunk: AtomicU64,
    games_completed: AtomicU64,
}

impl AnalyticsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, shot: &ShotAnalytics) {
        self.shots.fetch_add(1, Ordering::Relaxed);
        if shot.hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        if shot.sunk {
            self.ships_sunk.fetch_add(1, Ordering::Relaxed);
        }
        if shot.game_over {
            self.games_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            shots: self.shots.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            ships_sunk: self.ships_sunk.load(Ordering::Relaxed),
            games_completed: self.games_completed.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for AnalyticsRecorder {
    async fn handle(&self, job: &BackgroundJob) -> anyhow::Result<()> {
        let shot: ShotAnalytics = serde_json::from_value(job.payload.clone())?;
        self.record(&shot);
        Ok(())
    }
}

/// One row of the ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub name: String,
    pub wins: u32,
    pub losses: u32,
}

#[derive(Default)]
struct Table {
    records: HashMap<String, (u32, u32)>,
    ranking: Vec<Standing>,
}

/// Win/loss table keyed by display name, re-ranked after every result.
#[derive(Default)]
pub struct Leaderboard {
    table: RwLock<Table>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &MatchOutcome) {
        let mut table = self.table.write();
        table.records.entry(outcome.winner.clone()).or_default().0 += 1;
        table.records.entry(outcome.loser.clone()).or_default().1 += 1;

        let mut ranking: Vec<Standing> = table
            .records
            .iter()
            .map(|(name, (wins, losses))| Standing {
                name: name.clone(),
                wins: *wins,
                losses: *losses,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then(a.losses.cmp(&b.losses))
                .then_with(|| a.name.cmp(&b.name))
        });
        table.ranking = ranking;
    }

    /// Best `n` players.
    pub fn top(&self, n: usize) -> Vec<Standing> {
        self.table.read().ranking.iter().take(n).cloned().collect()
    }
}

#[async_trait::async_trait]
impl JobHandler for Leaderboard {
    async fn handle(&self, job: &BackgroundJob) -> anyhow::Result<()> {
        let outcome: MatchOutcome = serde_json::from_value(job.payload.clone())?;
        self.record(&outcome);
        debug!(
            "session {}: leaderboard updated, {} beat {}",
            job.session_id, outcome.winner, outcome.loser
        );
        Ok(())
    }
}

/// Plays the server-side AI's turn.
pub struct AiMoveHandler {
    server: Weak<GameServer>,
}

impl AiMoveHandler {
    pub fn new(server: Weak<GameServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl JobHandler for AiMoveHandler {
    async fn handle(&self, job: &BackgroundJob) -> anyhow::Result<()> {
        let turn: AiTurn = serde_json::from_value(job.payload.clone())?;
        let server = self
            .server
            .upgrade()
            .ok_or_else(|| anyhow!("game server is gone"))?;
        server.play_ai_turn(job.session_id, turn.ai).await?;
        Ok(())
    }
}
