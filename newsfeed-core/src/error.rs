//! Error types for the newsfeed core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Missing title for {0}")]
    MissingTitle(String),

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Unknown change kind: {0}")]
    UnknownChangeKind(String),
}

impl CoreError {
    pub fn invalid_link(link: impl Into<String>) -> Self {
        CoreError::InvalidLink(link.into())
    }

    pub fn missing_title(link: impl Into<String>) -> Self {
        CoreError::MissingTitle(link.into())
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
