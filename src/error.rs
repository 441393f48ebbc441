//! Error types for the wake listener

use thiserror::Error;

use crate::engine::EngineError;
use crate::presence::PresenceError;

/// Result type alias for wake listener operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the wake listener
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A start was requested without a credential
    #[error("credential is empty")]
    EmptyCredential,

    /// Detector engine failed to initialize or start
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The OS refused the wake resource or foreground indicator
    #[error("presence error: {0}")]
    Presence(#[from] PresenceError),

    /// The lifecycle controller thread is no longer running
    #[error("lifecycle controller is not running")]
    ControllerGone,

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable reason reported to the UI
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::EmptyCredential => "empty_credential",
            Self::Engine(EngineError::InvalidCredential) => "invalid_credential",
            Self::Engine(EngineError::EngineUnavailable(_)) => "engine_unavailable",
            Self::Presence(_) => "presence_denied",
            Self::ControllerGone => "controller_gone",
            Self::Database(_) | Self::Sqlite(_) => "storage",
            Self::Io(_) => "internal",
        }
    }
}
