use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("{channel} delivery failed: {message}")]
    ChannelError { channel: String, message: String },

    #[error("{channel} call timed out after {timeout_seconds} seconds")]
    Timeout { channel: String, timeout_seconds: u64 },

    #[error("Outbox operation failed: {0}")]
    OutboxError(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl NotificationError {
    pub fn channel(channel: &str, message: impl Into<String>) -> Self {
        NotificationError::ChannelError {
            channel: channel.to_string(),
            message: message.into(),
        }
    }
}
