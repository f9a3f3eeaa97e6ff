use std::sync::Arc;

use notification_cell::{Outbox, RealtimeHub};
use shared_config::AppConfig;

use crate::services::AppointmentService;

/// Shared state behind the `/appointments` routes.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub service: Arc<AppointmentService>,
    pub outbox: Arc<dyn Outbox>,
    pub realtime: RealtimeHub,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        service: Arc<AppointmentService>,
        outbox: Arc<dyn Outbox>,
        realtime: RealtimeHub,
    ) -> Self {
        Self {
            config,
            service,
            outbox,
            realtime,
        }
    }
}
