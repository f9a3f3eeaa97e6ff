// libs/appointment-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use axum_extra::TypedHeader;
use futures::stream::{self, Stream};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

use crate::models::{
    Actor, AppointmentError, CancelAppointmentQuery, ConflictCheckQuery, UpdateAppointmentRequest,
};
use crate::state::AppointmentState;

const DEAD_LETTER_PREVIEW: usize = 20;

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::NotFound => AppError::NotFound(message),
            AppointmentError::Forbidden | AppointmentError::UnrecognizedActor => AppError::Forbidden(message),
            AppointmentError::ConflictDetected(ids) => {
                let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
                AppError::Conflict(format!("{}: {}", message, ids.join(", ")))
            }
            AppointmentError::AlreadyCancelled | AppointmentError::VersionMismatch => AppError::Conflict(message),
            AppointmentError::InvalidStatusTransition(_) => AppError::BadRequest(message),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
            AppointmentError::ExternalServiceError(msg) => AppError::ExternalService(msg),
        }
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;

    let appointment = state.service
        .get_appointment(appointment_id, &actor, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment_history(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;

    let history = state.service
        .get_history(appointment_id, &actor, auth.token())
        .await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "lifecycle_history": history,
    })))
}

/// Partial update: reschedule, cancel or edit details.
#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;

    let appointment = state.service
        .update_appointment(appointment_id, request, &actor, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

/// DELETE is a cancellation; the row is kept.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Query(query): Query<CancelAppointmentQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;

    let appointment = state.service
        .cancel_appointment(appointment_id, query.reason, &actor, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
        "appointment_id": appointment.id,
        "cancelled_by": appointment.cancelled_by,
    })))
}

// ==============================================================================
// UTILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<ConflictCheckQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user)?;

    let response = state.service
        .check_conflicts(&query, &actor, auth.token())
        .await?;

    Ok(Json(json!(response)))
}

/// Outbox health for operators (admin only).
#[axum::debug_handler]
pub async fn get_notification_stats(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if user.parsed_role() != Some(UserRole::Admin) {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let stats = state.outbox.stats().await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let dead_letters = state.outbox.dead_letters(DEAD_LETTER_PREVIEW).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let live_sessions = state.realtime.get_active_channels().await.len();

    Ok(Json(json!({
        "stats": stats,
        "dead_letters": dead_letters,
        "live_sessions": live_sessions,
    })))
}

/// Server-sent events carrying the caller's realtime appointment updates.
pub async fn appointment_events(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let actor = Actor::from_user(&user)?;
    // Dropping the stream on disconnect releases the user's channel.
    let subscription = state.realtime.subscribe(actor.id).await;

    let events = stream::unfold(subscription, |mut subscription| async move {
        loop {
            match subscription.recv().await {
                Ok(message) => {
                    let event = Event::default().event("appointment").data(message);
                    return Some((Ok::<Event, Infallible>(event), subscription));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Realtime subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
