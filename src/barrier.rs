//! Readiness rendezvous used during ship placement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

use crate::error::GameError;
use crate::session::{ConnectionId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Gathering,
    Released,
    Failed,
}

struct Arrivals {
    seen: HashSet<ConnectionId>,
    phase: Phase,
}

/// One placement round for one session.
struct Rendezvous {
    expected: usize,
    deadline: Instant,
    arrivals: Mutex<Arrivals>,
    phase: watch::Sender<Phase>,
}

impl Rendezvous {
    fn new(expected: usize, deadline: Instant) -> Self {
        let (phase, _) = watch::channel(Phase::Gathering);
        Self {
            expected,
            deadline,
            arrivals: Mutex::new(Arrivals {
                seen: HashSet::new(),
                phase: Phase::Gathering,
            }),
            phase,
        }
    }

    /// Record an arrival and return the phase after it.
    fn arrive(&self, participant: ConnectionId) -> Phase {
        let mut arrivals = self.arrivals.lock();
        if arrivals.phase != Phase::Gathering {
            return arrivals.phase;
        }
        arrivals.seen.insert(participant);
        if arrivals.seen.len() >= self.expected {
            arrivals.phase = Phase::Released;
            self.phase.send_replace(Phase::Released);
        }
        arrivals.phase
    }

    /// Fail the round unless it already completed; returns the final phase.
    fn fail(&self) -> Phase {
        let mut arrivals = self.arrivals.lock();
        if arrivals.phase == Phase::Gathering {
            arrivals.phase = Phase::Failed;
            self.phase.send_replace(Phase::Failed);
        }
        arrivals.phase
    }
}

/// Lazily created per-session rendezvous points.
#[derive(Default)]
pub struct ReadinessBarriers {
    barriers: Mutex<HashMap<SessionId, Arc<Rendezvous>>>,
}

impl ReadinessBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `expected` distinct participants of `session_id` have
    /// arrived, or fail with [`GameError::ReadinessTimeout`].
    ///
    /// The deadline is fixed when the first participant arrives. The
    /// instance is discarded as soon as the round completes either way.
    pub async fn await_all_ready(
        &self,
        session_id: SessionId,
        participant: ConnectionId,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), GameError> {
        let barrier = {
            let mut barriers = self.barriers.lock();
            Arc::clone(barriers.entry(session_id).or_insert_with(|| {
                debug!("session {}: readiness round opened", session_id);
                Arc::new(Rendezvous::new(expected.max(1), Instant::now() + timeout))
            }))
        };
        let mut phase = barrier.phase.subscribe();

        match barrier.arrive(participant) {
            Phase::Released => {
                self.discard(session_id, &barrier);
                return Ok(());
            }
            Phase::Failed => {
                self.discard(session_id, &barrier);
                return Err(GameError::ReadinessTimeout);
            }
            Phase::Gathering => {}
        }

        let settled = timeout_at(
            barrier.deadline,
            phase.wait_for(|p| *p != Phase::Gathering),
        )
        .await
        .map(|waited| waited.map(|p| *p));
        let outcome = match settled {
            Ok(Ok(p)) => p,
            // The sender lives inside `barrier`, which we hold, so it cannot close.
            Ok(Err(_)) => barrier.fail(),
            Err(_) => {
                let outcome = barrier.fail();
                if outcome == Phase::Failed {
                    warn!(
                        "session {}: readiness timed out waiting for {} participants",
                        session_id, barrier.expected
                    );
                }
                outcome
            }
        };
        self.discard(session_id, &barrier);
        match outcome {
            Phase::Released => Ok(()),
            Phase::Gathering | Phase::Failed => Err(GameError::ReadinessTimeout),
        }
    }

    /// Fail every waiter of `session_id` now.
    pub fn abort(&self, session_id: SessionId) {
        let barrier = self.barriers.lock().remove(&session_id);
        if let Some(barrier) = barrier {
            barrier.fail();
            debug!("session {}: readiness round aborted", session_id);
        }
    }

    /// Rounds currently gathering.
    pub fn pending(&self) -> usize {
        self.barriers.lock().len()
    }

    fn discard(&self, session_id: SessionId, barrier: &Arc<Rendezvous>) {
        let mut barriers = self.barriers.lock();
        if barriers
            .get(&session_id)
            .is_some_and(|b| Arc::ptr_eq(b, barrier))
        {
            barriers.remove(&session_id);
        }
    }
}
