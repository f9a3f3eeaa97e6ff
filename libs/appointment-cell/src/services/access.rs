use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::UserRole;

use crate::models::{Actor, Appointment, MutationIntent};
use crate::services::directory::Directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Single authority for who may read or change an appointment.
pub struct AccessGate {
    directory: Arc<dyn Directory>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub async fn can_mutate(
        &self,
        actor: &Actor,
        appointment: &Appointment,
        intent: &MutationIntent,
        auth_token: &str,
    ) -> Decision {
        let decision = match actor.role {
            UserRole::Admin => Decision::Allow,
            UserRole::Dietitian => {
                if appointment.created_by == actor.id || appointment.dietitian == actor.id {
                    Decision::Allow
                } else {
                    Decision::Deny("dietitian is neither creator nor assigned provider")
                }
            }
            UserRole::HealthCounselor => {
                if appointment.created_by == actor.id
                    || self.is_assigned_counselor(actor.id, appointment.client, auth_token).await
                {
                    Decision::Allow
                } else {
                    Decision::Deny("health counselor is not assigned to this client")
                }
            }
            UserRole::Client => {
                if appointment.client != actor.id {
                    Decision::Deny("client does not own this appointment")
                } else if !intent.is_pure_cancellation() {
                    Decision::Deny("clients may only cancel")
                } else {
                    Decision::Allow
                }
            }
        };

        if let Decision::Deny(reason) = decision {
            warn!(
                "Denied {} {} on appointment {}: {}",
                actor.role, actor.id, appointment.id, reason
            );
        }

        decision
    }

    pub async fn has_access(&self, actor: &Actor, appointment: &Appointment, auth_token: &str) -> bool {
        match actor.role {
            UserRole::Admin => true,
            _ if appointment.dietitian == actor.id
                || appointment.client == actor.id
                || appointment.created_by == actor.id => true,
            UserRole::HealthCounselor => {
                self.is_assigned_counselor(actor.id, appointment.client, auth_token).await
            }
            _ => false,
        }
    }

    async fn is_assigned_counselor(&self, counselor_id: Uuid, client_id: Uuid, auth_token: &str) -> bool {
        match self.directory.get_client(client_id, auth_token).await {
            Ok(Some(client)) => client.assigned_health_counselor == Some(counselor_id),
            Ok(None) => {
                debug!("Client {} not found in directory", client_id);
                false
            }
            Err(e) => {
                warn!("Client lookup failed for {}, denying: {}", client_id, e);
                false
            }
        }
    }
}
