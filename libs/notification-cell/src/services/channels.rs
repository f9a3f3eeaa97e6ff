use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::{AppointmentEmail, NotificationError, PushMessage};

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_push(&self, message: &PushMessage) -> Result<(), NotificationError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_appointment_email(&self, email: &AppointmentEmail) -> Result<(), NotificationError>;
}

/// External calendar events, addressed by owner and event id.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    async fn update_event(
        &self,
        owner_id: Uuid,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: &str,
    ) -> Result<(), NotificationError>;

    async fn remove_event(&self, owner_id: Uuid, event_id: &str) -> Result<(), NotificationError>;
}

fn http_client(config: &AppConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.side_effect_timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|_| Client::new())
}

async fn ensure_success(channel: &str, response: reqwest::Response) -> Result<(), NotificationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    error!("{} service returned {}: {}", channel, status, body);
    Err(NotificationError::channel(channel, format!("HTTP {}: {}", status, body)))
}

/// Push gateway client. With no URL configured, pushes are skipped.
pub struct HttpPushSender {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpPushSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config),
            base_url: config.push_service_url.trim_end_matches('/').to_string(),
            token: config.push_service_token.clone(),
        }
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send_push(&self, message: &PushMessage) -> Result<(), NotificationError> {
        if self.base_url.is_empty() {
            debug!("Push disabled, skipping notification for {}", message.recipient_id);
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/send", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({
                "user_id": message.recipient_id,
                "title": message.title,
                "body": message.body,
                "data": message.data,
            }))
            .send()
            .await?;

        ensure_success("push", response).await?;
        info!("Push notification sent to user {}", message.recipient_id);
        Ok(())
    }
}

/// Transactional email API client.
pub struct HttpEmailSender {
    client: Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl HttpEmailSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config),
            base_url: config.email_service_url.trim_end_matches('/').to_string(),
            api_key: config.email_service_api_key.clone(),
            from_address: config.email_from_address.clone(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_appointment_email(&self, email: &AppointmentEmail) -> Result<(), NotificationError> {
        if self.base_url.is_empty() {
            debug!("Email disabled, skipping {} email", email.template());
            return Ok(());
        }

        let recipients = email.recipients();
        if recipients.is_empty() {
            debug!("No email addresses on appointment {}", email.appointment_id);
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "from": self.from_address,
                "to": recipients,
                "subject": email.subject(),
                "template": email.template(),
                "data": email,
            }))
            .send()
            .await?;

        ensure_success("email", response).await?;
        info!("Sent {} email for appointment {}", email.template(), email.appointment_id);
        Ok(())
    }
}

/// Calendar bridge client: `/users/{owner}/events/{event_id}`.
pub struct HttpCalendarSync {
    client: Client,
    base_url: String,
}

impl HttpCalendarSync {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config),
            base_url: config.calendar_service_url.trim_end_matches('/').to_string(),
        }
    }

    fn event_url(&self, owner_id: Uuid, event_id: &str) -> String {
        format!("{}/users/{}/events/{}", self.base_url, owner_id, event_id)
    }
}

#[async_trait]
impl CalendarSync for HttpCalendarSync {
    async fn update_event(
        &self,
        owner_id: Uuid,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: &str,
    ) -> Result<(), NotificationError> {
        if self.base_url.is_empty() {
            debug!("Calendar sync disabled, skipping update of {}", event_id);
            return Ok(());
        }

        let response = self
            .client
            .patch(self.event_url(owner_id, event_id))
            .json(&json!({
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
                "summary": summary,
            }))
            .send()
            .await?;

        ensure_success("calendar", response).await
    }

    async fn remove_event(&self, owner_id: Uuid, event_id: &str) -> Result<(), NotificationError> {
        if self.base_url.is_empty() {
            debug!("Calendar sync disabled, skipping removal of {}", event_id);
            return Ok(());
        }

        let response = self
            .client
            .delete(self.event_url(owner_id, event_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
            debug!("Calendar event {} already gone", event_id);
            return Ok(());
        }

        ensure_success("calendar", response).await
    }
}
