//! Error types for gex-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid strike spacing: {0}")]
    InvalidSpacing(String),

    #[error("Invalid strike range: {0}")]
    InvalidStrikeRange(String),

    #[error("Invalid option identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
