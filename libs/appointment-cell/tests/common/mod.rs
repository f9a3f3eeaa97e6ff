#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use appointment_cell::*;
use notification_cell::{InMemoryOutbox, IntentPayload, NotificationIntent};
use shared_models::auth::UserRole;

pub const TOKEN: &str = "test-token";

/// In-memory collaborators wired into a real service.
pub struct Harness {
    pub store: Arc<InMemoryAppointmentStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub outbox: Arc<InMemoryOutbox>,
    pub service: Arc<AppointmentService>,
    pub dietitian: Actor,
    pub client: Actor,
    pub counselor: Actor,
    pub admin: Actor,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let service = Arc::new(AppointmentService::new(
            store.clone(),
            directory.clone(),
            outbox.clone(),
            AppointmentCache::default(),
            3,
        ));

        let dietitian = Actor::new(Uuid::new_v4(), UserRole::Dietitian, "Dana Dietitian");
        let client = Actor::new(Uuid::new_v4(), UserRole::Client, "Carl Client");
        let counselor = Actor::new(Uuid::new_v4(), UserRole::HealthCounselor, "Hana Counselor");
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin, "Ada Admin");

        directory.add_client(ClientRecord {
            id: client.id,
            name: Some(client.name.clone()),
            email: Some("client@example.com".into()),
            assigned_health_counselor: Some(counselor.id),
        }).await;
        directory.add_user(UserRecord {
            id: dietitian.id,
            name: Some(dietitian.name.clone()),
            email: Some("dietitian@example.com".into()),
            role: Some("dietitian".into()),
        }).await;

        Self { store, directory, outbox, service, dietitian, client, counselor, admin }
    }

    /// Seeds a scheduled appointment between the harness dietitian and client.
    pub async fn seed(&self, scheduled_at: DateTime<Utc>, duration: i32) -> Appointment {
        let appointment = appointment(self.dietitian.id, self.client.id, scheduled_at, duration);
        self.store.insert(appointment.clone()).await;
        appointment
    }

    pub async fn stored(&self, id: Uuid) -> Appointment {
        self.store.snapshot(id).await.expect("appointment should exist")
    }

    pub async fn queued(&self) -> Vec<NotificationIntent> {
        self.outbox.pending().await
    }
}

pub fn appointment(dietitian: Uuid, client: Uuid, scheduled_at: DateTime<Utc>, duration: i32) -> Appointment {
    let created = Utc::now() - Duration::days(7);
    Appointment {
        id: Uuid::new_v4(),
        dietitian,
        client,
        created_by: dietitian,
        created_by_role: Some(UserRole::Dietitian),
        scheduled_at,
        duration,
        appointment_type: "follow_up".into(),
        meeting_link: None,
        mode_name: Some("virtual".into()),
        notes: None,
        status: AppointmentStatus::Scheduled,
        lifecycle_history: vec![],
        cancelled_by: None,
        rescheduled_by: None,
        google_calendar_event_id: CalendarEventIds::default(),
        version: 1,
        created_at: created,
        updated_at: created,
    }
}

/// Tomorrow at `hour:minute` UTC.
pub fn tomorrow_at(hour: u32, minute: u32) -> DateTime<Utc> {
    let day = (Utc::now() + Duration::days(1)).date_naive();
    day.and_hms_opt(hour, minute, 0)
        .expect("valid time")
        .and_utc()
}

pub fn channel_order(intents: &[NotificationIntent]) -> Vec<&'static str> {
    intents.iter().map(|i| i.payload.channel_name()).collect()
}

pub fn push_recipients(intents: &[NotificationIntent]) -> Vec<Uuid> {
    intents
        .iter()
        .filter_map(|i| match &i.payload {
            IntentPayload::Push(push) => Some(push.recipient_id),
            _ => None,
        })
        .collect()
}
