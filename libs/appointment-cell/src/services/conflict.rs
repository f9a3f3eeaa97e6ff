use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};
use crate::services::store::AppointmentStore;

pub struct ConflictChecker {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Active appointments of `provider_id` overlapping the proposed slot.
    pub async fn find_conflicts(
        &self,
        provider_id: Uuid,
        proposed_start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let proposed_end = proposed_start + Duration::minutes(duration_minutes as i64);
        debug!(
            "Checking conflicts for provider {} from {} to {}",
            provider_id, proposed_start, proposed_end
        );

        let candidates = self.store
            .find_active_for_provider(provider_id, proposed_end, auth_token)
            .await?;

        // The store filter is only a pre-filter.
        let conflicts: Vec<Appointment> = candidates
            .into_iter()
            .filter(|existing| Some(existing.id) != exclude_appointment_id)
            .filter(|existing| existing.dietitian == provider_id && existing.is_active())
            .filter(|existing| {
                Self::overlaps(proposed_start, proposed_end, existing.scheduled_at, existing.end_time())
            })
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for provider {} - {} conflicting appointments",
                provider_id,
                conflicts.len()
            );
        }

        Ok(conflicts)
    }

    pub async fn check(
        &self,
        provider_id: Uuid,
        proposed_start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let conflicting_appointments = self
            .find_conflicts(provider_id, proposed_start, duration_minutes, exclude_appointment_id, auth_token)
            .await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting_appointments.is_empty(),
            conflicting_appointments,
        })
    }

    /// Half-open overlap: touching intervals do not conflict.
    pub fn overlaps(
        start1: DateTime<Utc>,
        end1: DateTime<Utc>,
        start2: DateTime<Utc>,
        end2: DateTime<Utc>,
    ) -> bool {
        start1 < end2 && start2 < end1
    }
}
