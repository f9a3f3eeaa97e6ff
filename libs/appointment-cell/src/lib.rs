//! # Appointment Cell
//!
//! Lifecycle of existing appointments: reads, reschedules, detail edits and
//! cancellations, each gated by [`services::AccessGate`], checked against the
//! provider's calendar and recorded in the appointment's history. Side
//! effects are queued for the notification cell.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use models::*;
pub use router::appointment_routes;
pub use services::*;
pub use state::AppointmentState;
