use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use notification_cell::test_support::{Recorder, RecordingChannels};
use notification_cell::*;

fn push_intent(appointment_id: Uuid, recipient_id: Uuid) -> NotificationIntent {
    NotificationIntent::new(
        appointment_id,
        IntentPayload::Push(PushMessage {
            recipient_id,
            title: "Appointment Cancelled".to_string(),
            body: "Your appointment was cancelled".to_string(),
            data: json!({ "appointment_id": appointment_id }),
        }),
    )
}

fn email_intent(appointment_id: Uuid) -> NotificationIntent {
    NotificationIntent::new(
        appointment_id,
        IntentPayload::Email(AppointmentEmail {
            kind: AppointmentEventKind::Cancelled,
            appointment_id,
            client: EmailParty { name: "Client".into(), email: Some("client@example.com".into()) },
            provider: EmailParty { name: "Dietitian".into(), email: Some("dt@example.com".into()) },
            scheduled_at: Utc::now(),
            duration_minutes: 30,
            appointment_type: "follow_up".into(),
            previous_scheduled_at: None,
            performed_by_name: "Client".into(),
            performed_by_role: "Client".into(),
            reason: Some("sick".into()),
            meeting_link: None,
        }),
    )
}

fn dispatcher(outbox: Arc<InMemoryOutbox>, channels: &RecordingChannels) -> NotificationDispatcher {
    let config = DispatcherConfig {
        call_timeout_seconds: 1,
        ..DispatcherConfig::default()
    };
    NotificationDispatcher::new(config, outbox, channels.channels())
}

#[tokio::test]
async fn test_delivers_each_intent_to_its_channel() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::new();
    let appointment_id = Uuid::new_v4();
    let recipient = Uuid::new_v4();

    outbox.enqueue_all(vec![
        NotificationIntent::new(appointment_id, IntentPayload::Calendar(CalendarAction::Remove {
            owner_id: recipient,
            event_id: "evt-1".into(),
        })),
        push_intent(appointment_id, recipient),
        email_intent(appointment_id),
    ]).await.unwrap();

    let summary = dispatcher(outbox.clone(), &channels).dispatch_pending().await.unwrap();

    assert_eq!(summary, DispatchSummary { delivered: 3, retried: 0, dead_lettered: 0 });
    assert_eq!(channels.calendar.calls().len(), 1);
    assert_eq!(channels.push.calls()[0].recipient_id, recipient);
    assert_eq!(channels.email.calls().len(), 1);

    let stats = outbox.stats().await.unwrap();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::with_email(Recorder::failing_times(1));
    let appointment_id = Uuid::new_v4();

    outbox.enqueue(email_intent(appointment_id)).await.unwrap();

    let summary = dispatcher(outbox.clone(), &channels).dispatch_pending().await.unwrap();

    assert_eq!(summary.retried, 1);
    assert_eq!(summary.delivered, 1);
    assert_eq!(channels.email.calls().len(), 2, "second attempt should reach the email channel");
    assert_eq!(outbox.stats().await.unwrap().retried, 1);
}

#[tokio::test]
async fn test_permanent_failure_is_dead_lettered() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::with_email(Recorder::failing());
    let appointment_id = Uuid::new_v4();

    outbox.enqueue(email_intent(appointment_id).with_max_attempts(2)).await.unwrap();
    outbox.enqueue(push_intent(appointment_id, Uuid::new_v4())).await.unwrap();

    let summary = dispatcher(outbox.clone(), &channels).dispatch_pending().await.unwrap();

    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(summary.delivered, 1, "push must still go out while email is down");
    assert_eq!(channels.email.calls().len(), 2);

    let dead = outbox.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert_matches!(dead[0].payload, IntentPayload::Email(_));
    assert!(dead[0].last_error.as_deref().unwrap_or_default().contains("simulated outage"));
}

#[tokio::test]
async fn test_run_loop_stops_after_shutdown() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::new();
    let worker = Arc::new(dispatcher(outbox.clone(), &channels));

    outbox.enqueue(push_intent(Uuid::new_v4(), Uuid::new_v4())).await.unwrap();

    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    worker.shutdown().await;

    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("dispatcher should stop")
        .unwrap();
    assert_eq!(channels.push.calls().len(), 1);
}

#[tokio::test]
async fn test_restarted_worker_delivers_intents_left_in_flight() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::new();
    let appointment_id = Uuid::new_v4();

    outbox.enqueue_all(vec![
        push_intent(appointment_id, Uuid::new_v4()),
        push_intent(appointment_id, Uuid::new_v4()),
    ]).await.unwrap();

    // A worker took one intent and died before settling it.
    let stranded = outbox.dequeue().await.unwrap().unwrap();
    assert_eq!(outbox.stats().await.unwrap().in_flight, 1);
    let stranded_recipient = match stranded.payload {
        IntentPayload::Push(push) => push.recipient_id,
        other => panic!("unexpected payload {:?}", other),
    };

    let worker = Arc::new(dispatcher(outbox.clone(), &channels));
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    worker.shutdown().await;
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("dispatcher should stop")
        .unwrap();

    let recipients: Vec<Uuid> = channels.push.calls().iter().map(|p| p.recipient_id).collect();
    assert_eq!(recipients.len(), 2);
    assert!(recipients.contains(&stranded_recipient));

    let stats = outbox.stats().await.unwrap();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.delivered, 2);
}

#[tokio::test]
async fn test_zero_timeout_is_clamped_to_one_second() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let channels = RecordingChannels::new();
    outbox.enqueue(push_intent(Uuid::new_v4(), Uuid::new_v4())).await.unwrap();

    let worker = NotificationDispatcher::new(
        DispatcherConfig { call_timeout_seconds: 0, ..DispatcherConfig::default() },
        outbox.clone(),
        channels.channels(),
    );
    let summary = worker.dispatch_pending().await.unwrap();

    assert_eq!(summary, DispatchSummary { delivered: 1, retried: 0, dead_lettered: 0 });
    assert!(outbox.dead_letters(10).await.unwrap().is_empty());
}
