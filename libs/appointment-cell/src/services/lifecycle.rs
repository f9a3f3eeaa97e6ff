// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, AppointmentValidationRules,
    CancellationSnapshot, LifecycleAction, LifecycleDetails, LifecycleEvent, MutationIntent,
    RescheduleSnapshot, UpdateAppointmentRequest,
};

/// Owns the status state machine and the append-only lifecycle history.
pub struct LifecycleTracker {
    rules: AppointmentValidationRules,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::with_rules(AppointmentValidationRules::default())
    }

    pub fn with_rules(rules: AppointmentValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AppointmentValidationRules {
        &self.rules
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::Cancelled,
            ],
            // Terminal for this subsystem
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// Decides whether `intent` may be applied to an appointment in `current_status`.
    pub fn check_mutation(
        &self,
        current_status: AppointmentStatus,
        intent: &MutationIntent,
    ) -> Result<(), AppointmentError> {
        match current_status {
            AppointmentStatus::Cancelled if intent.cancels => Err(AppointmentError::AlreadyCancelled),
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => {
                Err(AppointmentError::InvalidStatusTransition(current_status))
            }
            AppointmentStatus::Scheduled => match intent.requested_status {
                Some(next) => self.validate_status_transition(current_status, next),
                None => Ok(()),
            },
        }
    }

    /// Request-shape validation that needs no stored state.
    pub fn validate_request(
        &self,
        request: &UpdateAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if let Some(duration) = request.duration {
            if duration < self.rules.min_duration_minutes || duration > self.rules.max_duration_minutes {
                return Err(AppointmentError::ValidationError(format!(
                    "Duration must be between {} and {} minutes",
                    self.rules.min_duration_minutes, self.rules.max_duration_minutes
                )));
            }
        }

        let cancels = request.status == Some(AppointmentStatus::Cancelled);
        if let Some(scheduled_at) = request.scheduled_at {
            if !cancels && !self.rules.allow_past_reschedule && scheduled_at <= now {
                return Err(AppointmentError::ValidationError(
                    "Appointment must be rescheduled to a future time".to_string(),
                ));
            }
        }

        if let Some(reason) = &request.cancellation_reason {
            if reason.chars().count() > self.rules.max_reason_length {
                return Err(AppointmentError::ValidationError(format!(
                    "Cancellation reason exceeds {} characters",
                    self.rules.max_reason_length
                )));
            }
        }

        Ok(())
    }

    pub fn record_event(
        &self,
        appointment: &mut Appointment,
        action: LifecycleAction,
        actor: &Actor,
        details: LifecycleDetails,
        at: DateTime<Utc>,
    ) {
        appointment.lifecycle_history.push(LifecycleEvent {
            action,
            performed_by: actor.id,
            performed_by_role: actor.role,
            performed_by_name: actor.name.clone(),
            timestamp: at,
            details,
        });
        Self::refresh_snapshots(appointment);

        info!(
            "Recorded {:?} on appointment {} by {} ({})",
            action, appointment.id, actor.id, actor.role
        );
    }

    pub fn record_created(&self, appointment: &mut Appointment, actor: &Actor, at: DateTime<Utc>) {
        let details = LifecycleDetails {
            new_scheduled_at: Some(appointment.scheduled_at),
            new_duration: Some(appointment.duration),
            ..LifecycleDetails::default()
        };
        self.record_event(appointment, LifecycleAction::Created, actor, details, at);
    }

    pub fn record_cancelled(
        &self,
        appointment: &mut Appointment,
        actor: &Actor,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        let details = LifecycleDetails {
            reason,
            ..LifecycleDetails::default()
        };
        self.record_event(appointment, LifecycleAction::Cancelled, actor, details, at);
    }

    pub fn record_rescheduled(
        &self,
        appointment: &mut Appointment,
        actor: &Actor,
        previous_scheduled_at: DateTime<Utc>,
        previous_duration: i32,
        at: DateTime<Utc>,
    ) {
        let details = LifecycleDetails {
            previous_scheduled_at: Some(previous_scheduled_at),
            new_scheduled_at: Some(appointment.scheduled_at),
            previous_duration: Some(previous_duration),
            new_duration: Some(appointment.duration),
            ..LifecycleDetails::default()
        };
        self.record_event(appointment, LifecycleAction::Rescheduled, actor, details, at);
    }

    /// Snapshots always mirror the latest matching history entry.
    pub fn refresh_snapshots(appointment: &mut Appointment) {
        appointment.cancelled_by = appointment
            .lifecycle_history
            .iter()
            .rev()
            .find(|event| event.action == LifecycleAction::Cancelled)
            .map(|event| CancellationSnapshot {
                user_id: event.performed_by,
                role: event.performed_by_role,
                name: event.performed_by_name.clone(),
                timestamp: event.timestamp,
                reason: event.details.reason.clone(),
            });

        appointment.rescheduled_by = appointment
            .lifecycle_history
            .iter()
            .rev()
            .find(|event| event.action == LifecycleAction::Rescheduled)
            .and_then(|event| {
                event.details.previous_scheduled_at.map(|previous| RescheduleSnapshot {
                    user_id: event.performed_by,
                    role: event.performed_by_role,
                    name: event.performed_by_name.clone(),
                    timestamp: event.timestamp,
                    previous_scheduled_at: previous,
                })
            });
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}
