// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::{User, UserRole};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub dietitian: Uuid,
    pub client: Uuid,
    pub created_by: Uuid,
    pub created_by_role: Option<UserRole>,
    pub scheduled_at: DateTime<Utc>,
    pub duration: i32,
    #[serde(rename = "type")]
    pub appointment_type: String,
    pub meeting_link: Option<String>,
    pub mode_name: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub lifecycle_history: Vec<LifecycleEvent>,
    pub cancelled_by: Option<CancellationSnapshot>,
    pub rescheduled_by: Option<RescheduleSnapshot>,
    #[serde(default)]
    pub google_calendar_event_id: CalendarEventIds,
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration as i64)
    }

    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// External calendar event ids, one per party.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalendarEventIds {
    pub dietitian: Option<String>,
    pub client: Option<String>,
}

impl CalendarEventIds {
    pub fn is_empty(&self) -> bool {
        self.dietitian.is_none() && self.client.is_none()
    }
}

// ==============================================================================
// LIFECYCLE HISTORY
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Created,
    Cancelled,
    Rescheduled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifecycleDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_duration: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleEvent {
    pub action: LifecycleAction,
    pub performed_by: Uuid,
    pub performed_by_role: UserRole,
    pub performed_by_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: LifecycleDetails,
}

/// Read-model copy of the latest `cancelled` history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancellationSnapshot {
    pub user_id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Read-model copy of the latest `rescheduled` history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescheduleSnapshot {
    pub user_id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub previous_scheduled_at: DateTime<Utc>,
}

// ==============================================================================
// ACTORS AND DIRECTORY RECORDS
// ==============================================================================

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
    pub name: String,
}

impl Actor {
    pub fn new(id: Uuid, role: UserRole, name: impl Into<String>) -> Self {
        Self { id, role, name: name.into() }
    }

    pub fn from_user(user: &User) -> Result<Self, AppointmentError> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::UnrecognizedActor)?;
        let role = user.parsed_role().ok_or(AppointmentError::UnrecognizedActor)?;

        Ok(Self {
            id,
            role,
            name: user.display_name(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub assigned_health_counselor: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub status: Option<AppointmentStatus>,
    pub cancellation_reason: Option<String>,
    #[serde(alias = "type")]
    pub appointment_type: Option<String>,
    pub meeting_link: Option<String>,
    pub mode_name: Option<String>,
    pub notes: Option<String>,
    /// Version the caller last read; a mismatch is rejected.
    pub version: Option<i64>,
}

impl UpdateAppointmentRequest {
    pub fn cancellation(reason: Option<String>) -> Self {
        Self {
            status: Some(AppointmentStatus::Cancelled),
            cancellation_reason: reason,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentQuery {
    pub reason: Option<String>,
}

/// What an update asks for, independent of who asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationIntent {
    pub cancels: bool,
    pub changes_schedule: bool,
    pub edits_details: bool,
    pub requested_status: Option<AppointmentStatus>,
}

impl MutationIntent {
    pub fn from_request(request: &UpdateAppointmentRequest) -> Self {
        Self {
            cancels: request.status == Some(AppointmentStatus::Cancelled),
            changes_schedule: request.scheduled_at.is_some() || request.duration.is_some(),
            edits_details: request.appointment_type.is_some()
                || request.meeting_link.is_some()
                || request.mode_name.is_some()
                || request.notes.is_some(),
            requested_status: request.status,
        }
    }

    pub fn is_pure_cancellation(&self) -> bool {
        self.cancels && !self.changes_schedule && !self.edits_details
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub dietitian_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration: i32,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// VALIDATION RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_reason_length: usize,
    pub allow_past_reschedule: bool,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 1,
            max_duration_minutes: 480,
            max_reason_length: 500,
            allow_past_reschedule: false,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Not authorized to modify this appointment")]
    Forbidden,

    #[error("Unrecognized user or role")]
    UnrecognizedActor,

    #[error("Appointment conflicts with {} existing booking(s)", .0.len())]
    ConflictDetected(Vec<Uuid>),

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Appointment was modified concurrently, reload and retry")]
    VersionMismatch,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appointment_row_round_trips_type_column() {
        let row = json!({
            "id": Uuid::new_v4(),
            "dietitian": Uuid::new_v4(),
            "client": Uuid::new_v4(),
            "created_by": Uuid::new_v4(),
            "created_by_role": "health_counselor",
            "scheduled_at": "2025-05-01T10:00:00Z",
            "duration": 60,
            "type": "initial",
            "meeting_link": null,
            "mode_name": "in-person",
            "notes": null,
            "status": "scheduled",
            "cancelled_by": null,
            "rescheduled_by": null,
            "created_at": "2025-04-01T10:00:00Z",
            "updated_at": "2025-04-01T10:00:00Z"
        });

        let appointment: Appointment = serde_json::from_value(row).unwrap();
        assert_eq!(appointment.appointment_type, "initial");
        assert!(appointment.lifecycle_history.is_empty());
        assert!(appointment.google_calendar_event_id.is_empty());
        assert_eq!(appointment.version, 0);
        assert_eq!(appointment.end_time().to_rfc3339(), "2025-05-01T11:00:00+00:00");

        let value = serde_json::to_value(&appointment).unwrap();
        assert_eq!(value["type"], "initial");
    }

    #[test]
    fn intent_classifies_payloads() {
        let cancel = MutationIntent::from_request(&UpdateAppointmentRequest::cancellation(Some("ill".into())));
        assert!(cancel.is_pure_cancellation());

        let sneaky = MutationIntent::from_request(&UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Cancelled),
            notes: Some("edited".into()),
            ..Default::default()
        });
        assert!(sneaky.cancels);
        assert!(!sneaky.is_pure_cancellation());

        let move_only = MutationIntent::from_request(&UpdateAppointmentRequest {
            duration: Some(45),
            ..Default::default()
        });
        assert!(move_only.changes_schedule);
        assert!(!move_only.cancels);
    }

    #[test]
    fn actor_requires_uuid_and_known_role() {
        let mut user = User {
            id: Uuid::new_v4().to_string(),
            email: Some("hc@example.com".into()),
            role: Some("health_counselor".into()),
            metadata: None,
            created_at: None,
        };
        let actor = Actor::from_user(&user).unwrap();
        assert_eq!(actor.role, UserRole::HealthCounselor);
        assert_eq!(actor.name, "hc@example.com");

        user.role = Some("patient".into());
        assert!(Actor::from_user(&user).is_err());

        user.role = Some("admin".into());
        user.id = "not-a-uuid".into();
        assert!(Actor::from_user(&user).is_err());
    }
}
