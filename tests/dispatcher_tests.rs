use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use broadside::{
    BackgroundJob, DispatchStats, Dispatcher, DispatcherConfig, GameError, JobHandler,
    JobHandlers, JobKind, SessionId,
};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

fn handlers(handler: Arc<dyn JobHandler>) -> JobHandlers {
    JobHandlers {
        ai_move: Arc::clone(&handler),
        analytics: Arc::clone(&handler),
        leaderboard: handler,
    }
}

fn config(workers: usize, max_in_flight: usize, queue_capacity: usize) -> DispatcherConfig {
    DispatcherConfig {
        workers,
        max_in_flight,
        queue_capacity,
    }
}

async fn settle(dispatcher: &Dispatcher, done: impl Fn(DispatchStats) -> bool) -> DispatchStats {
    timeout(Duration::from_secs(10), async {
        loop {
            let stats = dispatcher.stats();
            if done(stats) {
                return stats;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("jobs did not settle")
}

#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl JobHandler for Gauge {
    async fn handle(&self, _job: &BackgroundJob) -> anyhow::Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_never_exceeds_the_cap() -> anyhow::Result<()> {
    let gauge = Arc::new(Gauge::default());
    let dispatcher = Dispatcher::start(config(8, 2, 64), handlers(gauge.clone()));

    for _ in 0..20 {
        dispatcher.submit(SessionId::new(), JobKind::Analytics, json!({}))?;
    }
    let stats = settle(&dispatcher, |s| s.completed == 20).await;
    assert_eq!(stats.failed, 0);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {}", peak);

    dispatcher.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

struct Flaky {
    ok: AtomicUsize,
}

#[async_trait::async_trait]
impl JobHandler for Flaky {
    async fn handle(&self, job: &BackgroundJob) -> anyhow::Result<()> {
        match job.payload["mode"].as_str() {
            Some("fail") => bail!("refused"),
            Some("panic") => panic!("handler blew up"),
            _ => {
                self.ok.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failures_and_panics_are_isolated() -> anyhow::Result<()> {
    let flaky = Arc::new(Flaky {
        ok: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::start(config(2, 2, 64), handlers(flaky.clone()));
    let session = SessionId::new();

    for mode in ["ok", "fail", "panic", "ok", "panic", "ok"] {
        dispatcher.submit(session, JobKind::LeaderboardUpdate, json!({ "mode": mode }))?;
    }
    let stats = settle(&dispatcher, |s| s.completed + s.failed == 6).await;
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 3);
    assert_eq!(flaky.ok.load(Ordering::SeqCst), 3);

    // Workers survived the panics and keep serving.
    dispatcher.submit(session, JobKind::AiMove, json!({ "mode": "ok" }))?;
    settle(&dispatcher, |s| s.completed == 4).await;
    dispatcher.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

struct Gate {
    open: Semaphore,
}

#[async_trait::async_trait]
impl JobHandler for Gate {
    async fn handle(&self, _job: &BackgroundJob) -> anyhow::Result<()> {
        let _permit = self.open.acquire().await?;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_queue_rejects_and_shutdown_drops_backlog() -> anyhow::Result<()> {
    let gate = Arc::new(Gate {
        open: Semaphore::new(0),
    });
    let dispatcher = Dispatcher::start(config(1, 1, 1), handlers(gate.clone()));
    let session = SessionId::new();

    dispatcher.submit(session, JobKind::Analytics, json!({}))?;
    timeout(Duration::from_secs(5), async {
        while dispatcher.in_flight() != 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    dispatcher.submit(session, JobKind::Analytics, json!({}))?;
    let err = dispatcher
        .submit(session, JobKind::Analytics, json!({}))
        .unwrap_err();
    assert!(matches!(
        err,
        GameError::DispatchFailure {
            kind: JobKind::Analytics,
            ..
        }
    ));
    assert_eq!(dispatcher.stats().rejected, 1);

    // The running job never finishes, so the deadline aborts it.
    dispatcher.shutdown(Duration::from_millis(50)).await;
    let stats = dispatcher.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(dispatcher.in_flight(), 0);

    assert!(dispatcher
        .submit(session, JobKind::Analytics, json!({}))
        .is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_lets_running_jobs_finish() -> anyhow::Result<()> {
    let gauge = Arc::new(Gauge::default());
    let dispatcher = Dispatcher::start(config(4, 4, 16), handlers(gauge.clone()));
    for _ in 0..4 {
        dispatcher.submit(SessionId::new(), JobKind::AiMove, json!({}))?;
    }
    timeout(Duration::from_secs(5), async {
        while dispatcher.in_flight() == 0 {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await?;

    dispatcher.shutdown(Duration::from_secs(5)).await;
    let stats = dispatcher.stats();
    assert_eq!(stats.completed + stats.dropped, 4);
    assert!(stats.completed >= 1);
    assert_eq!(gauge.running.load(Ordering::SeqCst), 0);
    Ok(())
}
