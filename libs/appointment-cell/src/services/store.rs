use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};

/// Persistence seam for appointments.
///
/// `save` is a compare-and-set: it succeeds only when the stored row still
/// carries `expected_version`, and it returns the row with `version`
/// incremented and `updated_at` refreshed.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: Uuid, auth_token: &str) -> Result<Option<Appointment>, AppointmentError>;

    /// Non-cancelled appointments of a provider starting before `window_end`.
    async fn find_active_for_provider(
        &self,
        provider_id: Uuid,
        window_end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn save(
        &self,
        appointment: &Appointment,
        expected_version: i64,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    rows: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, appointment: Appointment) {
        self.rows.write().await.insert(appointment.id, appointment);
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<Appointment> {
        self.rows.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, id: Uuid, _auth_token: &str) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_active_for_provider(
        &self,
        provider_id: Uuid,
        window_end: DateTime<Utc>,
        _auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let rows = self.rows.read().await;
        let mut found: Vec<Appointment> = rows
            .values()
            .filter(|a| a.dietitian == provider_id && a.is_active() && a.scheduled_at < window_end)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.scheduled_at);
        Ok(found)
    }

    async fn save(
        &self,
        appointment: &Appointment,
        expected_version: i64,
        _auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.write().await;
        let current = rows.get(&appointment.id).ok_or(AppointmentError::NotFound)?;

        if current.version != expected_version {
            debug!(
                "Version check failed for {}: stored {}, expected {}",
                appointment.id, current.version, expected_version
            );
            return Err(AppointmentError::VersionMismatch);
        }

        let mut saved = appointment.clone();
        saved.version = expected_version + 1;
        saved.updated_at = Utc::now();
        rows.insert(saved.id, saved.clone());

        Ok(saved)
    }
}
