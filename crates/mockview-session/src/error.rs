//! Error types for the interview session orchestrator

use thiserror::Error;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while setting up or driving an interview session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credential request failed: {0}")]
    Credential(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Microphone error: {0}")]
    Microphone(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed: {0}")]
    Channel(String),
}

impl SessionError {
    /// True for the errors that make a start attempt fail (`SetupFailed` in the session model).
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Credential(_)
                | SessionError::Connect(_)
                | SessionError::Microphone(_)
                | SessionError::Publish(_)
        )
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Credential(err.to_string())
    }
}

impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}
