pub mod access;
pub mod appointment;
pub mod cache;
pub mod conflict;
pub mod directory;
pub mod lifecycle;
pub mod notification;
pub mod store;
pub mod supabase_store;

pub use access::{AccessGate, Decision};
pub use appointment::AppointmentService;
pub use cache::{AppointmentCache, FillTicket};
pub use conflict::ConflictChecker;
pub use directory::{Directory, InMemoryDirectory, SupabaseDirectory};
pub use lifecycle::LifecycleTracker;
pub use notification::{FanOut, NotificationPlanner, Parties};
pub use store::{AppointmentStore, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
