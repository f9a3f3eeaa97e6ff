use std::sync::Arc;

use axum::{
    Json,
    Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentState};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, appointments: Arc<AppointmentState>) -> Router {
    let configured = config.is_configured();

    Router::new()
        .route("/", get(|| async { "Dietcare API is running!" }))
        .route("/health", get(move || health(configured)))
        .nest("/appointments", appointment_routes(appointments))
}

async fn health(configured: bool) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "configured": configured,
    }))
}
