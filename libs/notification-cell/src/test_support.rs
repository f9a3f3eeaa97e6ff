//! Recording channel doubles shared by this cell's tests and the appointment
//! cell's tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    AppointmentEmail, CalendarAction, CalendarSync, EmailSender, NotificationChannels,
    NotificationError, PushMessage, PushSender, RealtimeBroadcaster, RealtimeEvent,
};

/// Records every call in order and fails the first `failures` calls.
pub struct Recorder<T> {
    calls: Mutex<Vec<T>>,
    failures: AtomicU32,
    always_fail: bool,
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: AtomicU32::new(0),
            always_fail: false,
        }
    }

    pub fn failing() -> Self {
        Self { always_fail: true, ..Self::new() }
    }

    pub fn failing_times(times: u32) -> Self {
        Self { failures: AtomicU32::new(times), ..Self::new() }
    }

    pub fn calls(&self) -> Vec<T> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, channel: &str, call: T) -> Result<(), NotificationError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.always_fail {
            return Err(NotificationError::channel(channel, "simulated outage"));
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(NotificationError::channel(channel, "simulated transient failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl PushSender for Recorder<PushMessage> {
    async fn send_push(&self, message: &PushMessage) -> Result<(), NotificationError> {
        self.record("push", message.clone())
    }
}

#[async_trait]
impl EmailSender for Recorder<AppointmentEmail> {
    async fn send_appointment_email(&self, email: &AppointmentEmail) -> Result<(), NotificationError> {
        self.record("email", email.clone())
    }
}

#[async_trait]
impl RealtimeBroadcaster for Recorder<RealtimeEvent> {
    async fn broadcast(&self, event: &RealtimeEvent) -> Result<(), NotificationError> {
        self.record("realtime", event.clone())
    }
}

#[async_trait]
impl CalendarSync for Recorder<CalendarAction> {
    async fn update_event(
        &self,
        owner_id: Uuid,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: &str,
    ) -> Result<(), NotificationError> {
        self.record("calendar", CalendarAction::Update {
            owner_id,
            event_id: event_id.to_string(),
            start,
            end,
            summary: summary.to_string(),
        })
    }

    async fn remove_event(&self, owner_id: Uuid, event_id: &str) -> Result<(), NotificationError> {
        self.record("calendar", CalendarAction::Remove {
            owner_id,
            event_id: event_id.to_string(),
        })
    }
}

/// Recorders for all four channels plus the matching [`NotificationChannels`].
pub struct RecordingChannels {
    pub calendar: Arc<Recorder<CalendarAction>>,
    pub push: Arc<Recorder<PushMessage>>,
    pub realtime: Arc<Recorder<RealtimeEvent>>,
    pub email: Arc<Recorder<AppointmentEmail>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::with_email(Recorder::new())
    }

    pub fn with_email(email: Recorder<AppointmentEmail>) -> Self {
        Self {
            calendar: Arc::new(Recorder::new()),
            push: Arc::new(Recorder::new()),
            realtime: Arc::new(Recorder::new()),
            email: Arc::new(email),
        }
    }

    pub fn channels(&self) -> NotificationChannels {
        NotificationChannels {
            calendar: self.calendar.clone(),
            push: self.push.clone(),
            realtime: self.realtime.clone(),
            email: self.email.clone(),
        }
    }
}

impl Default for RecordingChannels {
    fn default() -> Self {
        Self::new()
    }
}
