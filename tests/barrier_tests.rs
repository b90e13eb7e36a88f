use std::sync::Arc;
use std::time::Duration;

use broadside::{ConnectionId, GameError, ReadinessBarriers, SessionId};
use tokio::time::{sleep, timeout, Instant};

const LONG: Duration = Duration::from_secs(10);

async fn wait_for_pending(barriers: &ReadinessBarriers, n: usize) {
    timeout(Duration::from_secs(5), async {
        while barriers.pending() != n {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("barrier round never opened");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_arrivals_release_together() -> anyhow::Result<()> {
    let barriers = Arc::new(ReadinessBarriers::new());
    let session = SessionId::new();

    let first = {
        let barriers = Arc::clone(&barriers);
        tokio::spawn(async move {
            barriers
                .await_all_ready(session, ConnectionId(1), 2, LONG)
                .await
        })
    };
    wait_for_pending(&barriers, 1).await;
    assert!(!first.is_finished());

    barriers
        .await_all_ready(session, ConnectionId(2), 2, LONG)
        .await?;
    first.await??;
    assert_eq!(barriers.pending(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_expected_arrival_passes_straight_through() -> anyhow::Result<()> {
    let barriers = ReadinessBarriers::new();
    barriers
        .await_all_ready(SessionId::new(), ConnectionId(1), 1, LONG)
        .await?;
    assert_eq!(barriers.pending(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_fails_waiters_and_discards_the_round() -> anyhow::Result<()> {
    let barriers = ReadinessBarriers::new();
    let session = SessionId::new();

    let started = Instant::now();
    let err = barriers
        .await_all_ready(session, ConnectionId(1), 2, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, GameError::ReadinessTimeout);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(barriers.pending(), 0);

    // The next round starts fresh instead of inheriting the failure.
    let barriers = Arc::new(barriers);
    let other = {
        let barriers = Arc::clone(&barriers);
        tokio::spawn(async move {
            barriers
                .await_all_ready(session, ConnectionId(2), 2, LONG)
                .await
        })
    };
    barriers
        .await_all_ready(session, ConnectionId(1), 2, LONG)
        .await?;
    other.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeat_arrival_counts_once() {
    let barriers = Arc::new(ReadinessBarriers::new());
    let session = SessionId::new();
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let barriers = Arc::clone(&barriers);
            tokio::spawn(async move {
                barriers
                    .await_all_ready(session, ConnectionId(1), 2, Duration::from_millis(100))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), Err(GameError::ReadinessTimeout));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abort_wakes_waiters() -> anyhow::Result<()> {
    let barriers = Arc::new(ReadinessBarriers::new());
    let session = SessionId::new();
    let waiter = {
        let barriers = Arc::clone(&barriers);
        tokio::spawn(async move {
            barriers
                .await_all_ready(session, ConnectionId(1), 2, LONG)
                .await
        })
    };
    wait_for_pending(&barriers, 1).await;

    barriers.abort(session);
    let outcome = timeout(Duration::from_secs(2), waiter).await??;
    assert_eq!(outcome, Err(GameError::ReadinessTimeout));
    assert_eq!(barriers.pending(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sessions_do_not_share_rounds() -> anyhow::Result<()> {
    let barriers = Arc::new(ReadinessBarriers::new());
    let (a, b) = (SessionId::new(), SessionId::new());
    let waiting = {
        let barriers = Arc::clone(&barriers);
        tokio::spawn(async move { barriers.await_all_ready(a, ConnectionId(1), 2, LONG).await })
    };
    wait_for_pending(&barriers, 1).await;

    let err = barriers
        .await_all_ready(b, ConnectionId(2), 2, Duration::from_millis(30))
        .await
        .unwrap_err();
    assert_eq!(err, GameError::ReadinessTimeout);
    assert!(!waiting.is_finished());

    barriers.await_all_ready(a, ConnectionId(2), 2, LONG).await?;
    waiting.await??;
    Ok(())
}
