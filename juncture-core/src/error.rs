//! Error types for the juncture ecosystem.

use thiserror::Error;

/// Errors that can occur in juncture operations.
#[derive(Error, Debug)]
pub enum JunctureError {
    #[error("Not authenticated: connect a calendar first")]
    AuthRequired,

    #[error("Provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Auth code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("No account found for '{0}'")]
    ShareTargetNotFound(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Shared store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for JunctureError {
    fn from(err: reqwest::Error) -> Self {
        JunctureError::ProviderUnreachable(err.to_string())
    }
}

/// Result type alias for juncture operations.
pub type JunctureResult<T> = Result<T, JunctureError>;
