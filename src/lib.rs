pub mod ai;
mod barrier;
mod bitboard;
mod board;
mod config;
pub mod dispatch;
mod error;
mod events;
mod gateway;
mod logging;
mod matchmaking;
pub mod protocol;
mod registry;
mod server;
mod session;
mod ship;
mod shot;
pub mod transport;

pub use ai::{calc_pdf, choose_target, sample_pdf};
pub use barrier::ReadinessBarriers;
pub use bitboard::{BitBoard, BitBoardError};
pub use board::*;
pub use config::*;
pub use dispatch::handlers::{
    AiTurn, AnalyticsRecorder, AnalyticsSnapshot, Leaderboard, MatchOutcome, ShotAnalytics,
    Standing,
};
pub use dispatch::{
    BackgroundJob, DispatchStats, Dispatcher, DispatcherConfig, JobHandler, JobHandlers, JobKind,
};
pub use error::{ErrorKind, GameError, PlacementError};
pub use events::{Broadcaster, EventBus, GameEvent, PlayerSummary, SessionEvent};
pub use gateway::Gateway;
pub use logging::{init_logging, level_from};
pub use matchmaking::{MatchmakingQueue, QueueEntry};
pub use protocol::{Message, PROTOCOL_VERSION};
pub use registry::{Detached, Seat, SessionHandle, SessionRegistry};
pub use server::{GameServer, JoinOutcome, AI_NAME};
pub use session::*;
pub use ship::*;
pub use shot::{process_shot, Resolution, ShotResult};
pub use transport::in_memory::InMemoryTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
