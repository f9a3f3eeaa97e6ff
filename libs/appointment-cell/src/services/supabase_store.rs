use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};
use crate::services::store::AppointmentStore;

/// PostgREST-backed store. Every request runs with the caller's token.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    /// Columns a mutation may touch. Identity and ownership columns are never written.
    fn mutable_columns(appointment: &Appointment, next_version: i64, now: DateTime<Utc>) -> Value {
        json!({
            "scheduled_at": appointment.scheduled_at,
            "duration": appointment.duration,
            "type": appointment.appointment_type,
            "meeting_link": appointment.meeting_link,
            "mode_name": appointment.mode_name,
            "notes": appointment.notes,
            "status": appointment.status,
            "lifecycle_history": appointment.lifecycle_history,
            "cancelled_by": appointment.cancelled_by,
            "rescheduled_by": appointment.rescheduled_by,
            "google_calendar_event_id": appointment.google_calendar_event_id,
            "version": next_version,
            "updated_at": now,
        })
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get(&self, id: Uuid, auth_token: &str) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(Self::parse_rows(rows)?.into_iter().next())
    }

    async fn find_active_for_provider(
        &self,
        provider_id: Uuid,
        window_end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?dietitian=eq.{}&status=neq.cancelled&scheduled_at=lt.{}&order=scheduled_at.asc",
            provider_id,
            urlencoding::encode(&window_end.to_rfc3339())
        );
        debug!("Loading active appointments for provider {}", provider_id);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::parse_rows(rows)
    }

    async fn save(
        &self,
        appointment: &Appointment,
        expected_version: i64,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&version=eq.{}",
            appointment.id, expected_version
        );
        let body = Self::mutable_columns(appointment, expected_version + 1, Utc::now());

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                &[("prefer", "return=representation")],
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match Self::parse_rows(rows)?.into_iter().next() {
            Some(saved) => Ok(saved),
            None => {
                warn!(
                    "No row matched appointment {} at version {}",
                    appointment.id, expected_version
                );
                Err(AppointmentError::VersionMismatch)
            }
        }
    }
}
