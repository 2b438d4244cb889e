//! Error types for the realtime core.

use thiserror::Error;

/// Main error type for pool, subscription and configuration operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error on {topic}: {message}")]
    Transport { topic: String, message: String },

    #[error("Listener {listener} already has a handler on {topic}")]
    DuplicateListener { topic: String, listener: u64 },

    #[error("Channel limit reached: {limit} topics already open")]
    ChannelLimit { limit: usize },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RealtimeError {
    /// Build a transport error for `topic`.
    pub fn transport(topic: impl Into<String>, message: impl Into<String>) -> Self {
        RealtimeError::Transport {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
