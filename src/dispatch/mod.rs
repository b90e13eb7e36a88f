//! Bounded-concurrency, fire-and-forget background jobs.
//!
//! Submissions go into a bounded queue and return at once. A fixed pool of
//! workers pulls from the queue; a semaphore caps how many jobs run at the
//! same time. A job that fails or panics is logged and dropped: there is no
//! retry and no dead-letter record.

pub mod handlers;

use core::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::GameError;
use crate::session::SessionId;

/// The fixed set of background job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    AiMove,
    Analytics,
    LeaderboardUpdate,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::AiMove => "ai-move",
            JobKind::Analytics => "analytics",
            JobKind::LeaderboardUpdate => "leaderboard-update",
        };
        f.write_str(name)
    }
}

/// A queued unit of background work.
#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub session_id: SessionId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub enqueued_at: Instant,
}

/// Executes one kind of job.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &BackgroundJob) -> anyhow::Result<()>;
}

/// One handler per job kind.
#[derive(Clone)]
pub struct JobHandlers {
    pub ai_move: Arc<dyn JobHandler>,
    pub analytics: Arc<dyn JobHandler>,
    pub leaderboard: Arc<dyn JobHandler>,
}

impl JobHandlers {
    fn for_kind(&self, kind: JobKind) -> &Arc<dyn JobHandler> {
        match kind {
            JobKind::AiMove => &self.ai_move,
            JobKind::Analytics => &self.analytics,
            JobKind::LeaderboardUpdate => &self.leaderboard,
        }
    }
}

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub max_in_flight: usize,
    pub queue_capacity: usize,
}

impl From<&crate::config::ServerConfig> for DispatcherConfig {
    fn from(config: &crate::config::ServerConfig) -> Self {
        Self {
            workers: config.workers,
            max_in_flight: config.max_in_flight,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Counters describing what happened to submitted jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub completed: u64,
    pub failed: u64,
    /// Refused at submission because the queue was full or closed.
    pub rejected: u64,
    /// Accepted but still queued when the dispatcher shut down.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

pub struct Dispatcher {
    sender: mpsc::Sender<BackgroundJob>,
    receiver: Arc<Mutex<mpsc::Receiver<BackgroundJob>>>,
    accepting: AtomicBool,
    stop: watch::Sender<bool>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn start(config: DispatcherConfig, handlers: JobHandlers) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let admission = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        let (stop, _) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&admission),
                    handlers.clone(),
                    stop.subscribe(),
                    Arc::clone(&counters),
                ))
            })
            .collect();
        info!(
            "dispatcher started: {} workers, {} in flight max, queue {}",
            workers, config.max_in_flight, config.queue_capacity
        );

        Self {
            sender,
            receiver,
            accepting: AtomicBool::new(true),
            stop,
            workers: parking_lot::Mutex::new(handles),
            counters,
        }
    }

    /// Queue a job without waiting. A full or closed queue rejects the job.
    pub fn submit(
        &self,
        session_id: SessionId,
        kind: JobKind,
        payload: serde_json::Value,
    ) -> Result<(), GameError> {
        if !self.accepting.load(Ordering::SeqCst) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(GameError::DispatchFailure {
                kind,
                reason: "dispatcher is shut down".to_string(),
            });
        }
        let job = BackgroundJob {
            session_id,
            kind,
            payload,
            enqueued_at: Instant::now(),
        };
        self.sender.try_send(job).map_err(|e| {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "job queue is full",
                mpsc::error::TrySendError::Closed(_) => "job queue is closed",
            };
            warn!("session {}: rejected {} job: {}", session_id, kind, reason);
            GameError::DispatchFailure {
                kind,
                reason: reason.to_string(),
            }
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Jobs executing right now.
    pub fn in_flight(&self) -> u64 {
        self.counters.in_flight.load(Ordering::Relaxed)
    }

    /// Stop intake, let running jobs finish within `deadline`, and drop
    /// anything still queued. Workers still busy at the deadline are aborted.
    pub async fn shutdown(&self, deadline: Duration) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop.send_replace(true);
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());

        if tokio::time::timeout(deadline, futures::future::join_all(handles.iter_mut()))
            .await
            .is_err()
        {
            warn!(
                "dispatcher shutdown deadline of {:?} passed, aborting workers",
                deadline
            );
            for handle in &handles {
                handle.abort();
            }
            // Wait for the cancelled workers to unwind their running jobs.
            futures::future::join_all(handles).await;
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut dropped = 0u64;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
        info!("dispatcher stopped, {} queued jobs dropped", dropped);
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<BackgroundJob>>>,
    admission: Arc<Semaphore>,
    handlers: JobHandlers,
    mut stop: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        // Take a slot before taking a job so a waiting worker never holds work.
        let next = tokio::select! {
            biased;
            _ = stop.changed() => None,
            next = async {
                match Arc::clone(&admission).acquire_owned().await {
                    Ok(permit) => receiver.lock().await.recv().await.map(|job| (permit, job)),
                    Err(_) => None,
                }
            } => next,
        };
        let Some((permit, job)) = next else {
            break;
        };
        run_job(&handlers, job, &counters).await;
        drop(permit);
    }
    debug!("dispatch worker {} exiting", id);
}

/// Counts a running job until dropped, including when its worker is aborted.
struct InFlight<'a>(&'a AtomicU64);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn run_job(handlers: &JobHandlers, job: BackgroundJob, counters: &Counters) {
    let running = InFlight::enter(&counters.in_flight);
    let handler = Arc::clone(handlers.for_kind(job.kind));
    let outcome = AssertUnwindSafe(handler.handle(&job)).catch_unwind().await;
    drop(running);

    match outcome {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                "session {}: {} job done after {:?}",
                job.session_id,
                job.kind,
                job.enqueued_at.elapsed()
            );
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let failure = GameError::DispatchFailure {
                kind: job.kind,
                reason: format!("{:#}", e),
            };
            warn!("session {}: dropping job: {}", job.session_id, failure);
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                "session {}: {} handler panicked, job dropped",
                job.session_id, job.kind
            );
        }
    }
}
