use chrono::Utc;
use serde_json::json;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use notification_cell::*;

fn event_for(recipient_id: Uuid) -> RealtimeEvent {
    RealtimeEvent {
        recipient_id,
        event: "appointment_cancelled".to_string(),
        payload: json!({ "appointment_id": Uuid::new_v4() }),
        sent_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_hub_starts_empty() {
    let hub = RealtimeHub::default();
    assert!(hub.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_subscriber_receives_own_events_only() {
    let hub = RealtimeHub::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let mut alice_rx = hub.subscribe(alice).await;
    let mut bob_rx = hub.subscribe(bob).await;

    hub.broadcast(&event_for(alice)).await.unwrap();

    let message = timeout(Duration::from_secs(1), alice_rx.recv())
        .await
        .expect("alice should get the event")
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
    assert_eq!(parsed["event"], "appointment_cancelled");
    assert_eq!(parsed["recipient_id"], alice.to_string());

    assert!(bob_rx.try_recv().is_err(), "bob must not see alice's events");
}

#[tokio::test]
async fn test_offline_user_does_not_fail_broadcast() {
    let hub = RealtimeHub::new();

    hub.broadcast(&event_for(Uuid::new_v4())).await.unwrap();
    assert!(hub.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_clone_shares_channels() {
    let hub = RealtimeHub::new();
    let user = Uuid::new_v4();

    let mut subscription = hub.subscribe(user).await;
    let cloned = hub.clone();
    assert_eq!(cloned.get_active_channels().await, vec![user]);
    assert_eq!(subscription.user_id(), user);

    cloned.broadcast(&event_for(user)).await.unwrap();
    assert!(subscription.try_recv().is_ok());
}

#[tokio::test]
async fn test_channel_released_when_last_session_ends() {
    let hub = RealtimeHub::new();
    let user = Uuid::new_v4();

    let first = hub.subscribe(user).await;
    let second = hub.subscribe(user).await;

    drop(first);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hub.get_active_channels().await, vec![user]);

    drop(second);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(hub.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_short_sessions_do_not_accumulate_channels() {
    let hub = RealtimeHub::new();

    for _ in 0..1_000 {
        let subscription = hub.subscribe(Uuid::new_v4()).await;
        drop(subscription);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(hub.get_active_channels().await.is_empty());
}
