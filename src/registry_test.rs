use super::*;
use tokio::time::{Duration, timeout};

fn pong() -> ServerMessage {
    ServerMessage::Pong
}

#[tokio::test]
async fn register_and_send() {
    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register("alice", tx).await;

    registry.send("alice", pong()).await;
    let received = timeout(Duration::from_millis(100), rx.recv()).await.unwrap();
    assert!(matches!(received, Some(ServerMessage::Pong)));
}

#[tokio::test]
async fn send_to_unknown_user_is_noop() {
    let registry = ConnectionRegistry::new();
    registry.send("ghost", pong()).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn second_registration_supersedes_first() {
    let registry = ConnectionRegistry::new();
    let (tx_old, mut rx_old) = mpsc::channel(8);
    let (tx_new, mut rx_new) = mpsc::channel(8);

    let old_conn = registry.register("alice", tx_old).await;
    let new_conn = registry.register("alice", tx_new).await;
    assert_ne!(old_conn, new_conn);
    assert_eq!(registry.len().await, 1);

    // The old channel handle is closed: its receiver observes end-of-stream
    // because the registry dropped the only sender.
    assert!(rx_old.recv().await.is_none());

    // Sends reach only the new connection.
    registry.send("alice", pong()).await;
    assert!(matches!(rx_new.recv().await, Some(ServerMessage::Pong)));
}

#[tokio::test]
async fn stale_unregister_does_not_evict_successor() {
    let registry = ConnectionRegistry::new();
    let (tx_old, _rx_old) = mpsc::channel(8);
    let (tx_new, mut rx_new) = mpsc::channel(8);

    let old_conn = registry.register("alice", tx_old).await;
    let _new_conn = registry.register("alice", tx_new).await;

    // The superseded connection's cleanup path runs late.
    registry.unregister("alice", old_conn).await;
    assert_eq!(registry.len().await, 1);

    registry.send("alice", pong()).await;
    assert!(matches!(rx_new.recv().await, Some(ServerMessage::Pong)));
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::channel(8);
    let conn_id = registry.register("alice", tx).await;

    registry.unregister("alice", conn_id).await;
    registry.unregister("alice", conn_id).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn send_on_closed_channel_unregisters() {
    let registry = ConnectionRegistry::new();
    let (tx, rx) = mpsc::channel(8);
    registry.register("alice", tx).await;
    drop(rx);

    registry.send("alice", pong()).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn full_queue_drops_message_but_keeps_connection() {
    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(1);
    registry.register("alice", tx).await;

    registry.send("alice", pong()).await;
    registry.send("alice", pong()).await; // dropped: queue is full

    assert_eq!(registry.len().await, 1);
    assert!(matches!(rx.recv().await, Some(ServerMessage::Pong)));
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn broadcast_tolerates_partial_failure() {
    let registry = ConnectionRegistry::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, rx_b) = mpsc::channel(8);
    registry.register("alice", tx_a).await;
    registry.register("bob", tx_b).await;
    drop(rx_b);

    registry
        .broadcast_to(&["alice".into(), "bob".into(), "ghost".into()], &pong())
        .await;

    assert!(matches!(rx_a.recv().await, Some(ServerMessage::Pong)));
    // bob's dead channel was evicted; alice is untouched.
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn tracking_round_trip() {
    let registry = ConnectionRegistry::new();
    let (tx_a, _rx_a) = mpsc::channel(8);
    let (tx_b, _rx_b) = mpsc::channel(8);
    registry.register("alice", tx_a).await;
    registry.register("bob", tx_b).await;

    registry.track("alice", "carol").await;
    registry.track("bob", "carol").await;
    registry.track("bob", "dave").await;

    let mut viewers = registry.viewers_tracking("carol").await;
    viewers.sort();
    assert_eq!(viewers, vec!["alice", "bob"]);

    registry.forget_everywhere("carol").await;
    assert!(registry.viewers_tracking("carol").await.is_empty());
    assert_eq!(registry.viewers_tracking("dave").await, vec!["bob"]);
}

#[tokio::test]
async fn replace_tracking_overwrites() {
    let registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::channel(8);
    registry.register("alice", tx).await;

    registry.track("alice", "old").await;
    registry
        .replace_tracking("alice", HashSet::from(["new".to_owned()]))
        .await;

    assert!(registry.viewers_tracking("old").await.is_empty());
    assert_eq!(registry.viewers_tracking("new").await, vec!["alice"]);
}

#[tokio::test]
async fn supersede_resets_tracking() {
    let registry = ConnectionRegistry::new();
    let (tx_old, _rx_old) = mpsc::channel(8);
    registry.register("alice", tx_old).await;
    registry.track("alice", "bob").await;

    let (tx_new, _rx_new) = mpsc::channel(8);
    registry.register("alice", tx_new).await;

    // A fresh connection has seen nothing yet; it resyncs via request_radar.
    assert!(registry.viewers_tracking("bob").await.is_empty());
}
