use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The appointment change a fan-out was produced for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Cancelled,
    Rescheduled,
}

impl AppointmentEventKind {
    pub fn realtime_event_name(&self) -> &'static str {
        match self {
            AppointmentEventKind::Cancelled => "appointment_cancelled",
            AppointmentEventKind::Rescheduled => "appointment_rescheduled",
        }
    }
}

/// One unit of outbox work: a single call on a single channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub payload: IntentPayload,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl NotificationIntent {
    pub fn new(appointment_id: Uuid, payload: IntentPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            payload,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn channel_name(&self) -> &'static str {
        self.payload.channel_name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "channel", content = "data", rename_all = "snake_case")]
pub enum IntentPayload {
    Calendar(CalendarAction),
    Push(PushMessage),
    Realtime(RealtimeEvent),
    Email(AppointmentEmail),
}

impl IntentPayload {
    pub fn channel_name(&self) -> &'static str {
        match self {
            IntentPayload::Calendar(_) => "calendar",
            IntentPayload::Push(_) => "push",
            IntentPayload::Realtime(_) => "realtime",
            IntentPayload::Email(_) => "email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CalendarAction {
    Update {
        owner_id: Uuid,
        event_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: String,
    },
    Remove {
        owner_id: Uuid,
        event_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeEvent {
    pub recipient_id: Uuid,
    pub event: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailParty {
    pub name: String,
    pub email: Option<String>,
}

/// Structured payload for the transactional appointment email template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentEmail {
    pub kind: AppointmentEventKind,
    pub appointment_id: Uuid,
    pub client: EmailParty,
    pub provider: EmailParty,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub appointment_type: String,
    pub previous_scheduled_at: Option<DateTime<Utc>>,
    pub performed_by_name: String,
    pub performed_by_role: String,
    pub reason: Option<String>,
    pub meeting_link: Option<String>,
}

impl AppointmentEmail {
    pub fn subject(&self) -> String {
        match self.kind {
            AppointmentEventKind::Cancelled => format!(
                "Appointment on {} cancelled",
                self.scheduled_at.format("%b %d, %Y at %H:%M UTC")
            ),
            AppointmentEventKind::Rescheduled => format!(
                "Appointment rescheduled to {}",
                self.scheduled_at.format("%b %d, %Y at %H:%M UTC")
            ),
        }
    }

    pub fn template(&self) -> &'static str {
        match self.kind {
            AppointmentEventKind::Cancelled => "appointment_cancelled",
            AppointmentEventKind::Rescheduled => "appointment_rescheduled",
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        [&self.client.email, &self.provider.email]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutboxStats {
    pub pending: u64,
    pub in_flight: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_id: String,
    pub call_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("notifier-{}", Uuid::new_v4()),
            call_timeout_seconds: 10,
            poll_interval_ms: 100,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub delivered: u32,
    pub retried: u32,
    pub dead_lettered: u32,
}
