//! Error types for the moderation subsystem
//!
//! Every lifecycle, store and facade operation reports one of these kinds. The
//! command surface decides how they are shown to users.

use thiserror::Error;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Record or channel does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate enrollment or duplicate active restriction
    #[error("Already active: {0}")]
    AlreadyActive(String),

    /// Caller or bot lacks a required capability
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed duration, target or other argument
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Snapshot could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    Gateway(#[from] Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for ModerationError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::Gateway(Box::new(error))
    }
}

impl From<std::io::Error> for ModerationError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_yaml::Error> for ModerationError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl ModerationError {
    /// Create a not-found error for a record of the given kind
    pub fn record_not_found(kind: impl std::fmt::Display, id: u64) -> Self {
        Self::NotFound(format!("{kind} #{id}"))
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
