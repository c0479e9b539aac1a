//! Top-level error for validation, repair, queueing and scheduling.

use super::error_code::{self, MigratorErrorCode};
use super::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum MigratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown double-write pattern: {pattern}")]
    UnknownPattern { pattern: String },

    #[error("Unknown validation direction: {direction}")]
    UnknownDirection { direction: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MigratorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Configuration and request errors are the caller's fault and are never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownPattern { .. }
                | Self::UnknownDirection { .. }
                | Self::Config { .. }
                | Self::InvalidRequest { .. }
                | Self::Serialization(_)
        )
    }
}

impl MigratorErrorCode for MigratorError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(e) => e.error_code(),
            Self::UnknownPattern { .. } => error_code::UNKNOWN_PATTERN,
            Self::UnknownDirection { .. } => error_code::UNKNOWN_DIRECTION,
            Self::Config { .. } => error_code::CONFIG_ERROR,
            Self::Queue { .. } => error_code::QUEUE_ERROR,
            Self::Cancelled { .. } => error_code::CANCELLED,
            Self::InvalidRequest { .. } => error_code::INVALID_REQUEST,
            Self::Serialization(_) => error_code::SERIALIZATION_ERROR,
            Self::Internal { .. } => error_code::INTERNAL_ERROR,
        }
    }
}

pub type MigratorResult<T> = Result<T, MigratorError>;
