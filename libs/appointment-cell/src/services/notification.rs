use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{
    AppointmentEmail, AppointmentEventKind, CalendarAction, EmailParty, IntentPayload,
    NotificationIntent, Outbox, PushMessage, RealtimeEvent,
};

use crate::models::{Actor, Appointment, CalendarEventIds};
use crate::services::directory::Directory;

/// Everything a fan-out needs about one committed change.
#[derive(Debug, Clone)]
pub struct FanOut<'a> {
    pub appointment: &'a Appointment,
    pub kind: AppointmentEventKind,
    pub actor: &'a Actor,
    /// Calendar events to update or remove. On cancellation these are the
    /// ids taken off the appointment before it was saved.
    pub calendar_events: CalendarEventIds,
    pub previous_scheduled_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Parties {
    pub client: EmailParty,
    pub provider: EmailParty,
}

/// Turns committed appointment changes into outbox intents.
pub struct NotificationPlanner {
    directory: Arc<dyn Directory>,
    outbox: Arc<dyn Outbox>,
    max_attempts: u32,
}

impl NotificationPlanner {
    pub fn new(directory: Arc<dyn Directory>, outbox: Arc<dyn Outbox>, max_attempts: u32) -> Self {
        Self {
            directory,
            outbox,
            max_attempts,
        }
    }

    /// Enqueues the fan-out for a change. Never fails the caller.
    pub async fn notify(&self, fan_out: FanOut<'_>, auth_token: &str) {
        let parties = self.resolve_parties(fan_out.appointment, auth_token).await;
        let intents = self.plan(&fan_out, &parties);
        let count = intents.len();

        match self.outbox.enqueue_all(intents).await {
            Ok(()) => info!(
                "Queued {} notification intents for appointment {}",
                count, fan_out.appointment.id
            ),
            Err(e) => warn!(
                "Failed to queue notifications for appointment {}: {}",
                fan_out.appointment.id, e
            ),
        }
    }

    /// Who hears about a change made by `actor`.
    pub fn recipients(appointment: &Appointment, actor: &Actor) -> Vec<Uuid> {
        if actor.id == appointment.client {
            return vec![appointment.dietitian];
        }

        let mut recipients = vec![appointment.client];
        if actor.id != appointment.dietitian && appointment.dietitian != appointment.client {
            recipients.push(appointment.dietitian);
        }
        recipients
    }

    /// Calendar intents first, then push and realtime per recipient, then one email.
    pub fn plan(&self, fan_out: &FanOut<'_>, parties: &Parties) -> Vec<NotificationIntent> {
        let appointment = fan_out.appointment;
        let mut payloads = Self::calendar_payloads(fan_out);

        let (title, body) = Self::push_copy(fan_out);
        let event_name = fan_out.kind.realtime_event_name();
        let now = Utc::now();

        for recipient_id in Self::recipients(appointment, fan_out.actor) {
            payloads.push(IntentPayload::Push(PushMessage {
                recipient_id,
                title: title.clone(),
                body: body.clone(),
                data: json!({
                    "type": event_name,
                    "appointment_id": appointment.id,
                }),
            }));
            payloads.push(IntentPayload::Realtime(RealtimeEvent {
                recipient_id,
                event: event_name.to_string(),
                payload: json!({
                    "appointment_id": appointment.id,
                    "status": appointment.status,
                    "scheduled_at": appointment.scheduled_at,
                    "duration": appointment.duration,
                    "performed_by": fan_out.actor.id,
                    "performed_by_role": fan_out.actor.role,
                }),
                sent_at: now,
            }));
        }

        payloads.push(IntentPayload::Email(AppointmentEmail {
            kind: fan_out.kind,
            appointment_id: appointment.id,
            client: parties.client.clone(),
            provider: parties.provider.clone(),
            scheduled_at: appointment.scheduled_at,
            duration_minutes: appointment.duration,
            appointment_type: appointment.appointment_type.clone(),
            previous_scheduled_at: fan_out.previous_scheduled_at,
            performed_by_name: fan_out.actor.name.clone(),
            performed_by_role: fan_out.actor.role.label().to_string(),
            reason: fan_out.reason.clone(),
            meeting_link: appointment.meeting_link.clone(),
        }));

        debug!(
            "Planned {} intents for appointment {} ({:?})",
            payloads.len(),
            appointment.id,
            fan_out.kind
        );

        payloads
            .into_iter()
            .map(|payload| NotificationIntent::new(appointment.id, payload).with_max_attempts(self.max_attempts))
            .collect()
    }

    fn calendar_payloads(fan_out: &FanOut<'_>) -> Vec<IntentPayload> {
        let appointment = fan_out.appointment;
        let owners = [
            (appointment.dietitian, &fan_out.calendar_events.dietitian),
            (appointment.client, &fan_out.calendar_events.client),
        ];

        owners
            .into_iter()
            .filter_map(|(owner_id, event_id)| event_id.clone().map(|event_id| (owner_id, event_id)))
            .map(|(owner_id, event_id)| {
                let action = match fan_out.kind {
                    AppointmentEventKind::Cancelled => CalendarAction::Remove { owner_id, event_id },
                    AppointmentEventKind::Rescheduled => CalendarAction::Update {
                        owner_id,
                        event_id,
                        start: appointment.scheduled_at,
                        end: appointment.end_time(),
                        summary: format!("{} appointment", appointment.appointment_type),
                    },
                };
                IntentPayload::Calendar(action)
            })
            .collect()
    }

    fn push_copy(fan_out: &FanOut<'_>) -> (String, String) {
        let when = fan_out.appointment.scheduled_at.format("%b %d, %Y at %H:%M UTC");
        let role = fan_out.actor.role.label();

        match fan_out.kind {
            AppointmentEventKind::Cancelled => (
                "Appointment Cancelled".to_string(),
                format!("Your appointment on {} was cancelled by the {}", when, role),
            ),
            AppointmentEventKind::Rescheduled => (
                "Appointment Rescheduled".to_string(),
                format!("Your appointment was moved to {} by the {}", when, role),
            ),
        }
    }

    async fn resolve_parties(&self, appointment: &Appointment, auth_token: &str) -> Parties {
        let client = match self.directory.get_client(appointment.client, auth_token).await {
            Ok(Some(record)) => EmailParty {
                name: record.name.unwrap_or_else(|| "Client".to_string()),
                email: record.email,
            },
            Ok(None) => Self::placeholder("Client"),
            Err(e) => {
                warn!("Client lookup for notifications failed: {}", e);
                Self::placeholder("Client")
            }
        };

        let provider = match self.directory.get_user(appointment.dietitian, auth_token).await {
            Ok(Some(record)) => EmailParty {
                name: record.name.unwrap_or_else(|| "Dietitian".to_string()),
                email: record.email,
            },
            Ok(None) => Self::placeholder("Dietitian"),
            Err(e) => {
                warn!("Provider lookup for notifications failed: {}", e);
                Self::placeholder("Dietitian")
            }
        };

        Parties { client, provider }
    }

    fn placeholder(name: &str) -> EmailParty {
        EmailParty {
            name: name.to_string(),
            email: None,
        }
    }
}
