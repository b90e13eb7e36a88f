use std::sync::Arc;

use broadside::{ConnectionId, GameError, PlayerKind, Seat, SessionRegistry, SessionState};

#[tokio::test(flavor = "multi_thread")]
async fn test_create_and_lookup() -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let (id, handle) = registry.create_session(
        Seat::human(ConnectionId(1), "alice"),
        Seat::ai(ConnectionId(2), "bot"),
    )?;

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.session_for_connection(ConnectionId(1)), Some(id));
    assert_eq!(registry.session_for_connection(ConnectionId(2)), Some(id));
    assert!(Arc::ptr_eq(&registry.get_session(id).unwrap(), &handle));

    let session = handle.lock().await;
    assert_eq!(session.state(), SessionState::PlacingShips);
    let kinds: Vec<_> = session.players().map(|p| p.kind()).collect();
    assert_eq!(kinds, vec![PlayerKind::Human, PlayerKind::Ai]);
    assert!(!session.player(ConnectionId(1)).unwrap().is_ready());
    assert!(session.player(ConnectionId(2)).unwrap().is_ready());
    Ok(())
}

#[test]
fn test_connection_cannot_join_two_sessions() {
    let registry = SessionRegistry::new();
    registry
        .create_session(
            Seat::human(ConnectionId(1), "alice"),
            Seat::human(ConnectionId(2), "bob"),
        )
        .unwrap();
    let err = registry
        .create_session(
            Seat::human(ConnectionId(3), "carol"),
            Seat::human(ConnectionId(2), "bob"),
        )
        .unwrap_err();
    assert_eq!(err, GameError::InvalidState);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.session_for_connection(ConnectionId(3)), None);

    assert_eq!(
        registry
            .create_session(
                Seat::human(ConnectionId(4), "dave"),
                Seat::human(ConnectionId(4), "dave"),
            )
            .unwrap_err(),
        GameError::InvalidState
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_retires_with_its_last_human() -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let (id, handle) = registry.create_session(
        Seat::human(ConnectionId(1), "alice"),
        Seat::human(ConnectionId(2), "bob"),
    )?;

    let first = registry.remove_connection(ConnectionId(1)).await.unwrap();
    assert_eq!(first.session_id, id);
    assert!(!first.retired);
    assert_eq!(registry.len(), 1);
    assert!(!handle.lock().await.player(ConnectionId(1)).unwrap().is_attached());

    // Unknown or already-removed connections are ignored.
    assert!(registry.remove_connection(ConnectionId(1)).await.is_none());
    assert!(registry.remove_connection(ConnectionId(77)).await.is_none());

    let second = registry.remove_connection(ConnectionId(2)).await.unwrap();
    assert!(second.retired);
    assert!(registry.is_empty());
    assert!(registry.get_session(id).is_none());
    assert!(handle.lock().await.is_retired());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ai_session_retires_when_human_leaves() -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let (id, _) = registry.create_session(
        Seat::human(ConnectionId(1), "alice"),
        Seat::ai(ConnectionId(2), "bot"),
    )?;
    let detached = registry.remove_connection(ConnectionId(1)).await.unwrap();
    assert_eq!(detached.session_id, id);
    assert!(detached.retired);
    assert_eq!(registry.session_for_connection(ConnectionId(2)), None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_creation_across_sessions() -> anyhow::Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let tasks: Vec<_> = (0..32u64)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry.create_session(
                    Seat::human(ConnectionId(i * 2), format!("p{}", i * 2)),
                    Seat::human(ConnectionId(i * 2 + 1), format!("p{}", i * 2 + 1)),
                )
            })
        })
        .collect();
    for task in tasks {
        task.await??;
    }
    assert_eq!(registry.len(), 32);
    assert_eq!(registry.session_ids().len(), 32);
    Ok(())
}
