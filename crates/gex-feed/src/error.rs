//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed initialization failed: {0}")]
    InitFailed(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Failed to subscribe to {topic} after {attempts} attempts: {reason}")]
    SubscriptionFailed {
        topic: String,
        attempts: u32,
        reason: String,
    },

    #[error("Data processing error: {0}")]
    DataProcessing(String),

    #[error("Producer spawn failed: {0}")]
    Spawn(String),

    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Core error: {0}")]
    Core(#[from] gex_core::CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
