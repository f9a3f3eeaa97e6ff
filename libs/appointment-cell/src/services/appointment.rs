// libs/appointment-cell/src/services/appointment.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::{AppointmentEventKind, Outbox};

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, CalendarEventIds,
    ConflictCheckQuery, ConflictCheckResponse, LifecycleEvent, MutationIntent,
    UpdateAppointmentRequest,
};
use crate::services::access::AccessGate;
use crate::services::cache::AppointmentCache;
use crate::services::conflict::ConflictChecker;
use crate::services::directory::Directory;
use crate::services::lifecycle::LifecycleTracker;
use crate::services::notification::{FanOut, NotificationPlanner};
use crate::services::store::AppointmentStore;

/// The side effect a committed mutation owes its participants.
enum Committed {
    Cancelled {
        calendar_events: CalendarEventIds,
        reason: Option<String>,
    },
    Rescheduled {
        previous_scheduled_at: chrono::DateTime<Utc>,
    },
    Edited,
}

pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    gate: AccessGate,
    conflicts: ConflictChecker,
    lifecycle: LifecycleTracker,
    planner: NotificationPlanner,
    cache: AppointmentCache,
}

impl AppointmentService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn Directory>,
        outbox: Arc<dyn Outbox>,
        cache: AppointmentCache,
        notification_max_attempts: u32,
    ) -> Self {
        Self {
            gate: AccessGate::new(directory.clone()),
            conflicts: ConflictChecker::new(store.clone()),
            lifecycle: LifecycleTracker::new(),
            planner: NotificationPlanner::new(directory, outbox, notification_max_attempts),
            store,
            cache,
        }
    }

    pub fn cache(&self) -> &AppointmentCache {
        &self.cache
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = match self.cache.get(appointment_id).await {
            Some(cached) => cached,
            None => {
                let ticket = self.cache.fill_ticket();
                let loaded = self.load(appointment_id, auth_token).await?;
                self.cache.fill(loaded.clone(), ticket).await;
                loaded
            }
        };

        if !self.gate.has_access(actor, &appointment, auth_token).await {
            return Err(AppointmentError::Forbidden);
        }

        Ok(appointment)
    }

    pub async fn get_history(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        auth_token: &str,
    ) -> Result<Vec<LifecycleEvent>, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, actor, auth_token).await?;
        Ok(appointment.lifecycle_history)
    }

    pub async fn check_conflicts(
        &self,
        query: &ConflictCheckQuery,
        actor: &Actor,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        if !actor.role.is_staff() {
            return Err(AppointmentError::Forbidden);
        }
        let rules = self.lifecycle.rules();
        if query.duration < rules.min_duration_minutes || query.duration > rules.max_duration_minutes {
            return Err(AppointmentError::ValidationError(format!(
                "Duration must be between {} and {} minutes",
                rules.min_duration_minutes, rules.max_duration_minutes
            )));
        }

        self.conflicts
            .check(
                query.dietitian_id,
                query.scheduled_at,
                query.duration,
                query.exclude_appointment_id,
                auth_token,
            )
            .await
    }

    /// Applies a partial update: cancellation, reschedule and detail edits.
    ///
    /// Nothing is written unless authorization, the state machine and the
    /// conflict check all pass. Notifications are queued after the save and
    /// cannot fail the update.
    #[instrument(skip(self, request, auth_token), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: &Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let current = self.load(appointment_id, auth_token).await?;

        // Nothing about the stored row or the payload is reported to an
        // actor the gate turns away.
        let intent = MutationIntent::from_request(&request);
        if !self.gate.can_mutate(actor, &current, &intent, auth_token).await.is_allowed() {
            return Err(AppointmentError::Forbidden);
        }

        if let Some(expected) = request.version {
            if expected != current.version {
                warn!(
                    "Stale update for appointment {}: client has version {}, stored {}",
                    appointment_id, expected, current.version
                );
                return Err(AppointmentError::VersionMismatch);
            }
        }

        self.lifecycle.validate_request(&request, now)?;
        self.lifecycle.check_mutation(current.status, &intent)?;

        let mut updated = current.clone();
        Self::apply_detail_edits(&mut updated, &request);

        let committed = if intent.cancels {
            if intent.changes_schedule {
                warn!(
                    "Ignoring schedule fields in cancellation of appointment {}",
                    appointment_id
                );
            }

            let calendar_events = std::mem::take(&mut updated.google_calendar_event_id);
            updated.status = AppointmentStatus::Cancelled;
            self.lifecycle.record_cancelled(
                &mut updated,
                actor,
                request.cancellation_reason.clone(),
                now,
            );

            Committed::Cancelled {
                calendar_events,
                reason: request.cancellation_reason.clone(),
            }
        } else if intent.changes_schedule {
            let new_start = request.scheduled_at.unwrap_or(current.scheduled_at);
            let new_duration = request.duration.unwrap_or(current.duration);

            let conflicts = self.conflicts
                .find_conflicts(current.dietitian, new_start, new_duration, Some(current.id), auth_token)
                .await?;
            if !conflicts.is_empty() {
                return Err(AppointmentError::ConflictDetected(
                    conflicts.iter().map(|a| a.id).collect(),
                ));
            }

            if new_start != current.scheduled_at || new_duration != current.duration {
                updated.scheduled_at = new_start;
                updated.duration = new_duration;
                self.lifecycle.record_rescheduled(
                    &mut updated,
                    actor,
                    current.scheduled_at,
                    current.duration,
                    now,
                );
                Committed::Rescheduled {
                    previous_scheduled_at: current.scheduled_at,
                }
            } else {
                debug!("Schedule unchanged for appointment {}", appointment_id);
                Committed::Edited
            }
        } else {
            Committed::Edited
        };

        let saved = self.store.save(&updated, current.version, auth_token).await?;
        self.cache.invalidate(&saved).await;

        info!(
            "Appointment {} updated by {} ({}), now {} at version {}",
            saved.id, actor.id, actor.role, saved.status, saved.version
        );

        self.fan_out(&saved, actor, committed, auth_token).await;

        Ok(saved)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        actor: &Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.update_appointment(
            appointment_id,
            UpdateAppointmentRequest::cancellation(reason),
            actor,
            auth_token,
        )
        .await
    }

    async fn load(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        self.store
            .get(appointment_id, auth_token)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    fn apply_detail_edits(appointment: &mut Appointment, request: &UpdateAppointmentRequest) {
        if let Some(appointment_type) = &request.appointment_type {
            appointment.appointment_type = appointment_type.clone();
        }
        if let Some(link) = &request.meeting_link {
            appointment.meeting_link = Some(link.clone());
        }
        if let Some(mode) = &request.mode_name {
            appointment.mode_name = Some(mode.clone());
        }
        if let Some(notes) = &request.notes {
            appointment.notes = Some(notes.clone());
        }
    }

    async fn fan_out(&self, saved: &Appointment, actor: &Actor, committed: Committed, auth_token: &str) {
        let fan_out = match committed {
            Committed::Cancelled { calendar_events, reason } => FanOut {
                appointment: saved,
                kind: AppointmentEventKind::Cancelled,
                actor,
                calendar_events,
                previous_scheduled_at: None,
                reason,
            },
            Committed::Rescheduled { previous_scheduled_at } => FanOut {
                appointment: saved,
                kind: AppointmentEventKind::Rescheduled,
                actor,
                calendar_events: saved.google_calendar_event_id.clone(),
                previous_scheduled_at: Some(previous_scheduled_at),
                reason: None,
            },
            Committed::Edited => return,
        };

        self.planner.notify(fan_out, auth_token).await;
    }
}
