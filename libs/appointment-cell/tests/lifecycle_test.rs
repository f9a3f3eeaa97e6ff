mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use appointment_cell::*;
use common::*;
use shared_models::auth::UserRole;

fn scheduled() -> Appointment {
    appointment(Uuid::new_v4(), Uuid::new_v4(), tomorrow_at(10, 0), 60)
}

fn intent(request: &UpdateAppointmentRequest) -> MutationIntent {
    MutationIntent::from_request(request)
}

#[test]
fn test_only_scheduled_appointments_can_change() {
    let tracker = LifecycleTracker::new();
    let cancel = intent(&UpdateAppointmentRequest::cancellation(None));
    let edit = intent(&UpdateAppointmentRequest { notes: Some("x".into()), ..Default::default() });

    assert!(tracker.check_mutation(AppointmentStatus::Scheduled, &cancel).is_ok());
    assert_matches!(
        tracker.check_mutation(AppointmentStatus::Cancelled, &cancel),
        Err(AppointmentError::AlreadyCancelled)
    );
    assert_matches!(
        tracker.check_mutation(AppointmentStatus::Cancelled, &edit),
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Cancelled))
    );
    assert_matches!(
        tracker.check_mutation(AppointmentStatus::Completed, &cancel),
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed))
    );
}

#[test]
fn test_completion_is_not_a_transition_here() {
    let tracker = LifecycleTracker::new();
    let complete = intent(&UpdateAppointmentRequest {
        status: Some(AppointmentStatus::Completed),
        ..Default::default()
    });
    let stay = intent(&UpdateAppointmentRequest {
        status: Some(AppointmentStatus::Scheduled),
        ..Default::default()
    });

    assert_matches!(
        tracker.check_mutation(AppointmentStatus::Scheduled, &complete),
        Err(AppointmentError::InvalidStatusTransition(_))
    );
    assert!(tracker.check_mutation(AppointmentStatus::Scheduled, &stay).is_ok());
    assert!(tracker.get_valid_transitions(AppointmentStatus::Cancelled).is_empty());
}

#[test]
fn test_request_validation() {
    let tracker = LifecycleTracker::new();
    let now = Utc::now();

    let zero = UpdateAppointmentRequest { duration: Some(0), ..Default::default() };
    let huge = UpdateAppointmentRequest { duration: Some(481), ..Default::default() };
    let past = UpdateAppointmentRequest { scheduled_at: Some(now - Duration::hours(1)), ..Default::default() };
    let essay = UpdateAppointmentRequest::cancellation(Some("x".repeat(501)));

    assert_matches!(tracker.validate_request(&zero, now), Err(AppointmentError::ValidationError(_)));
    assert_matches!(tracker.validate_request(&huge, now), Err(AppointmentError::ValidationError(_)));
    assert_matches!(tracker.validate_request(&past, now), Err(AppointmentError::ValidationError(_)));
    assert_matches!(tracker.validate_request(&essay, now), Err(AppointmentError::ValidationError(_)));

    // Schedule fields on a cancellation are ignored, not rejected.
    let cancel_with_past = UpdateAppointmentRequest {
        scheduled_at: Some(now - Duration::hours(1)),
        ..UpdateAppointmentRequest::cancellation(None)
    };
    assert!(tracker.validate_request(&cancel_with_past, now).is_ok());
}

#[test]
fn test_reschedule_records_previous_slot() {
    let tracker = LifecycleTracker::new();
    let actor = Actor::new(Uuid::new_v4(), UserRole::Admin, "Ada Admin");
    let mut appt = scheduled();
    let original = appt.scheduled_at;

    appt.scheduled_at = original + Duration::hours(2);
    appt.duration = 45;
    tracker.record_rescheduled(&mut appt, &actor, original, 60, Utc::now());

    let event = appt.lifecycle_history.last().unwrap();
    assert_eq!(event.action, LifecycleAction::Rescheduled);
    assert_eq!(event.details.previous_scheduled_at, Some(original));
    assert_eq!(event.details.new_scheduled_at, Some(original + Duration::hours(2)));
    assert_eq!(event.details.previous_duration, Some(60));
    assert_eq!(event.details.new_duration, Some(45));

    let snapshot = appt.rescheduled_by.unwrap();
    assert_eq!(snapshot.previous_scheduled_at, original);
    assert_eq!(snapshot.role, UserRole::Admin);
    assert_eq!(appt.status, AppointmentStatus::Scheduled);
}

#[test]
fn test_snapshots_follow_latest_history_entry() {
    let tracker = LifecycleTracker::new();
    let first = Actor::new(Uuid::new_v4(), UserRole::Dietitian, "First");
    let second = Actor::new(Uuid::new_v4(), UserRole::HealthCounselor, "Second");
    let mut appt = scheduled();
    let t0 = appt.scheduled_at;

    tracker.record_created(&mut appt, &first, Utc::now());
    tracker.record_rescheduled(&mut appt, &first, t0, 60, Utc::now());
    tracker.record_rescheduled(&mut appt, &second, t0 + Duration::hours(1), 60, Utc::now());
    tracker.record_cancelled(&mut appt, &second, Some("travel".into()), Utc::now());

    assert_eq!(appt.lifecycle_history.len(), 4);
    let rescheduled = appt.rescheduled_by.clone().unwrap();
    assert_eq!(rescheduled.user_id, second.id);
    assert_eq!(rescheduled.previous_scheduled_at, t0 + Duration::hours(1));

    let cancelled = appt.cancelled_by.clone().unwrap();
    assert_eq!(cancelled.name, "Second");
    assert_eq!(cancelled.reason.as_deref(), Some("travel"));

    // A tampered snapshot is restored from history.
    appt.cancelled_by = None;
    LifecycleTracker::refresh_snapshots(&mut appt);
    assert_eq!(appt.cancelled_by, Some(cancelled));
}
