//! Error types for hubbub.

use thiserror::Error;

/// Common error type for hubbub.
#[derive(Error, Debug)]
pub enum ChatError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error for persisted chatter records.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A condition clause could not be parsed.
    #[error("condition error: {0}")]
    Condition(#[from] crate::condition::ConditionError),

    /// A second chatter provider tried to install itself.
    ///
    /// The first installed provider always stays in place.
    #[error("chatter provider '{offending}' rejected: '{installed}' is already installed")]
    ProviderConflict {
        /// Name of the provider that attempted the installation.
        offending: String,
        /// Name of the provider already in use.
        installed: String,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Message delivery to a recipient failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A background persistence task stopped before reporting back.
    #[error("persistence task aborted: {0}")]
    TaskAborted(String),
}

/// Result type alias for hubbub operations.
pub type Result<T> = std::result::Result<T, ChatError>;
