use std::sync::Arc;

use broadside::{ConnectionId, GameError, MatchmakingQueue, QueueEntry, SessionRegistry};

fn queue() -> (Arc<SessionRegistry>, MatchmakingQueue) {
    let registry = Arc::new(SessionRegistry::new());
    (Arc::clone(&registry), MatchmakingQueue::new(registry))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_join_pairs_with_the_head() -> anyhow::Result<()> {
    let (registry, queue) = queue();
    assert_eq!(queue.join(ConnectionId(1), "alice").await?, None);
    assert_eq!(queue.len().await, 1);

    let session_id = queue.join(ConnectionId(2), "bob").await?.unwrap();
    assert!(queue.is_empty().await);
    assert_eq!(registry.session_for_connection(ConnectionId(1)), Some(session_id));
    assert_eq!(registry.session_for_connection(ConnectionId(2)), Some(session_id));

    // The longest waiter is player one.
    let handle = registry.get_session(session_id).unwrap();
    let session = handle.lock().await;
    let order: Vec<_> = session.players().map(|p| p.name().to_string()).collect();
    assert_eq!(order, vec!["alice", "bob"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fifo_order_survives_cancellation() -> anyhow::Result<()> {
    let (registry, queue) = queue();
    queue.join(ConnectionId(1), "a").await?;
    let sid = queue.join(ConnectionId(2), "b").await?.unwrap();
    assert_eq!(registry.session_for_connection(ConnectionId(1)), Some(sid));

    assert_eq!(queue.join(ConnectionId(3), "c").await?, None);
    assert!(queue.cancel(ConnectionId(3)).await);
    // Double cancel and cancel of a stranger are no-ops.
    assert!(!queue.cancel(ConnectionId(3)).await);
    assert!(!queue.cancel(ConnectionId(42)).await);

    assert_eq!(queue.join(ConnectionId(4), "d").await?, None);
    assert_eq!(queue.join(ConnectionId(4), "d").await?, None);
    assert_eq!(
        queue.snapshot().await,
        vec![QueueEntry {
            connection: ConnectionId(4),
            name: "d".to_string()
        }]
    );
    let sid = queue.join(ConnectionId(5), "e").await?.unwrap();
    assert_eq!(registry.session_for_connection(ConnectionId(4)), Some(sid));
    assert_eq!(registry.session_for_connection(ConnectionId(3)), None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_seated_connection_cannot_queue() -> anyhow::Result<()> {
    let (_, queue) = queue();
    queue.join(ConnectionId(1), "a").await?;
    queue.join(ConnectionId(2), "b").await?;
    assert_eq!(
        queue.join(ConnectionId(1), "a").await.unwrap_err(),
        GameError::InvalidState
    );
    assert!(queue.is_empty().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_joins_pair_everyone_once() -> anyhow::Result<()> {
    let (registry, queue) = queue();
    let queue = Arc::new(queue);
    let joins: Vec<_> = (0..64u64)
        .map(|i| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.join(ConnectionId(i), format!("p{}", i)).await })
        })
        .collect();

    let mut paired = 0;
    for join in joins {
        if join.await??.is_some() {
            paired += 1;
        }
    }
    assert_eq!(paired, 32);
    assert!(queue.is_empty().await);
    assert_eq!(registry.len(), 32);
    for i in 0..64u64 {
        assert!(registry.session_for_connection(ConnectionId(i)).is_some());
    }
    Ok(())
}
