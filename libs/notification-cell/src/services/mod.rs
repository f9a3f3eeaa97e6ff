pub mod channels;
pub mod dispatcher;
pub mod outbox;
pub mod realtime;
pub mod redis_outbox;

pub use channels::*;
pub use dispatcher::*;
pub use outbox::*;
pub use realtime::*;
pub use redis_outbox::*;
