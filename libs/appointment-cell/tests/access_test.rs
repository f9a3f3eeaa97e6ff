mod common;

use std::sync::Arc;

use uuid::Uuid;

use appointment_cell::*;
use common::*;
use shared_models::auth::UserRole;

fn cancel_only() -> MutationIntent {
    MutationIntent::from_request(&UpdateAppointmentRequest::cancellation(Some("sick".into())))
}

fn reschedule() -> MutationIntent {
    MutationIntent::from_request(&UpdateAppointmentRequest {
        scheduled_at: Some(tomorrow_at(15, 0)),
        ..Default::default()
    })
}

async fn gate_for(h: &Harness) -> AccessGate {
    AccessGate::new(h.directory.clone())
}

#[tokio::test]
async fn test_admin_and_owning_dietitian_may_mutate() {
    let h = Harness::new().await;
    let appt = h.seed(tomorrow_at(10, 0), 60).await;
    let gate = gate_for(&h).await;

    assert!(gate.can_mutate(&h.admin, &appt, &reschedule(), TOKEN).await.is_allowed());
    assert!(gate.can_mutate(&h.dietitian, &appt, &reschedule(), TOKEN).await.is_allowed());

    let stranger = Actor::new(Uuid::new_v4(), UserRole::Dietitian, "Other");
    assert!(!gate.can_mutate(&stranger, &appt, &reschedule(), TOKEN).await.is_allowed());
}

#[tokio::test]
async fn test_dietitian_who_created_booking_for_colleague_may_mutate() {
    let h = Harness::new().await;
    let booker = Actor::new(Uuid::new_v4(), UserRole::Dietitian, "Booker");
    let mut appt = appointment(h.dietitian.id, h.client.id, tomorrow_at(10, 0), 60);
    appt.created_by = booker.id;

    let gate = gate_for(&h).await;
    assert!(gate.can_mutate(&booker, &appt, &reschedule(), TOKEN).await.is_allowed());
}

#[tokio::test]
async fn test_counselor_needs_assignment_or_authorship() {
    let h = Harness::new().await;
    let appt = h.seed(tomorrow_at(10, 0), 60).await;
    let gate = gate_for(&h).await;

    assert!(gate.can_mutate(&h.counselor, &appt, &reschedule(), TOKEN).await.is_allowed());

    let unassigned = Actor::new(Uuid::new_v4(), UserRole::HealthCounselor, "Other HC");
    assert_eq!(
        gate.can_mutate(&unassigned, &appt, &reschedule(), TOKEN).await,
        Decision::Deny("health counselor is not assigned to this client")
    );

    let mut authored = appt.clone();
    authored.created_by = unassigned.id;
    assert!(gate.can_mutate(&unassigned, &authored, &reschedule(), TOKEN).await.is_allowed());
}

#[tokio::test]
async fn test_directory_outage_denies_counselor() {
    let h = Harness::new().await;
    let appt = h.seed(tomorrow_at(10, 0), 60).await;
    h.directory.set_unavailable(true).await;

    let gate = gate_for(&h).await;
    assert!(!gate.can_mutate(&h.counselor, &appt, &reschedule(), TOKEN).await.is_allowed());
    assert!(!gate.has_access(&h.counselor, &appt, TOKEN).await);
}

#[tokio::test]
async fn test_client_may_only_cancel_own_appointment() {
    let h = Harness::new().await;
    let appt = h.seed(tomorrow_at(10, 0), 60).await;
    let gate = gate_for(&h).await;

    assert!(gate.can_mutate(&h.client, &appt, &cancel_only(), TOKEN).await.is_allowed());
    assert!(!gate.can_mutate(&h.client, &appt, &reschedule(), TOKEN).await.is_allowed());

    let cancel_and_edit = MutationIntent::from_request(&UpdateAppointmentRequest {
        notes: Some("please call".into()),
        ..UpdateAppointmentRequest::cancellation(None)
    });
    assert!(!gate.can_mutate(&h.client, &appt, &cancel_and_edit, TOKEN).await.is_allowed());

    let other_client = Actor::new(Uuid::new_v4(), UserRole::Client, "Other");
    assert!(!gate.can_mutate(&other_client, &appt, &cancel_only(), TOKEN).await.is_allowed());
}

#[tokio::test]
async fn test_read_access() {
    let h = Harness::new().await;
    let appt = h.seed(tomorrow_at(10, 0), 60).await;
    let gate = AccessGate::new(Arc::new(InMemoryDirectory::new()));

    assert!(gate.has_access(&h.client, &appt, TOKEN).await);
    assert!(gate.has_access(&h.dietitian, &appt, TOKEN).await);
    assert!(gate.has_access(&h.admin, &appt, TOKEN).await);
    // Empty directory: the counselor's assignment cannot be confirmed.
    assert!(!gate.has_access(&h.counselor, &appt, TOKEN).await);
    assert!(gate_for(&h).await.has_access(&h.counselor, &appt, TOKEN).await);

    let outsider = Actor::new(Uuid::new_v4(), UserRole::Client, "Nosy");
    assert!(!gate.has_access(&outsider, &appt, TOKEN).await);
}
