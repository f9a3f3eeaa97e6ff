//! # Notification Cell
//!
//! Best-effort side effects of appointment changes: calendar sync, push
//! notifications, realtime events and transactional email.
//!
//! Producers never call a channel directly. They build
//! [`NotificationIntent`]s and put them in an [`Outbox`]; the
//! [`NotificationDispatcher`] drains the outbox in the background, bounds
//! every external call with a timeout, retries failures and keeps
//! exhausted intents in a dead-letter list.

pub mod models;
pub mod services;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use models::*;
pub use error::*;
pub use services::*;
