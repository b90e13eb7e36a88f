//! FIFO matchmaking of waiting connections.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::GameError;
use crate::registry::{Seat, SessionRegistry};
use crate::session::{ConnectionId, SessionId};

/// A connection waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub connection: ConnectionId,
    pub name: String,
}

/// Pairs waiting connections in arrival order.
///
/// Join and Cancel run one at a time under a single async mutex that is held
/// through session creation, so a connection is either paired or cancelled,
/// never both.
pub struct MatchmakingQueue {
    registry: Arc<SessionRegistry>,
    waiting: Mutex<VecDeque<QueueEntry>>,
}

impl MatchmakingQueue {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            waiting: Mutex::new(VecDeque::new()),
        }
    }

    /// Pair `connection` with the longest-waiting connection, or queue it.
    ///
    /// Returns the new session when a pairing happened and `None` while
    /// waiting. Joining again while queued is a no-op.
    pub async fn join(
        &self,
        connection: ConnectionId,
        name: impl Into<String>,
    ) -> Result<Option<SessionId>, GameError> {
        let mut waiting = self.waiting.lock().await;
        if self.registry.session_for_connection(connection).is_some() {
            return Err(GameError::InvalidState);
        }
        if waiting.iter().any(|e| e.connection == connection) {
            return Ok(None);
        }
        let name = name.into();

        let Some(head) = waiting.pop_front() else {
            debug!("{} ({}) waiting for an opponent", connection, name);
            waiting.push_back(QueueEntry { connection, name });
            return Ok(None);
        };

        let created = self.registry.create_session(
            Seat::human(head.connection, head.name.clone()),
            Seat::human(connection, name),
        );
        match created {
            Ok((session_id, _)) => {
                info!(
                    "matched {} with {} in session {}",
                    head.connection, connection, session_id
                );
                Ok(Some(session_id))
            }
            Err(e) => {
                // Keep the head's place in line if the session could not be built.
                waiting.push_front(head);
                Err(e)
            }
        }
    }

    /// Drop a pending entry. Unknown or already-cancelled connections are ignored.
    pub async fn cancel(&self, connection: ConnectionId) -> bool {
        let mut waiting = self.waiting.lock().await;
        let before = waiting.len();
        waiting.retain(|e| e.connection != connection);
        let removed = waiting.len() != before;
        if removed {
            debug!("{} left the matchmaking queue", connection);
        }
        removed
    }

    /// Waiting connections.
    pub async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Waiting connections in queue order.
    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        self.waiting.lock().await.iter().cloned().collect()
    }
}
