// Error types shared by every portal operation

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoparError {
    // Bad caller input: unknown command, vehicle index out of range. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    // The portal answered with something other than the expected document.
    // Only `Session::call_authenticated` should ever see this variant.
    #[error("not logged in")]
    NotAuthenticated,

    #[error("authentication failed: {0}")]
    Authentication(String),

    // The portal's contract changed: missing HTML field, missing JSON key.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("remote command did not finish within {0:?}")]
    PollTimeout(Duration),

    #[error("remote command polling was cancelled")]
    Cancelled,
}

impl MoparError {
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, MoparError::NotAuthenticated)
    }
}

pub type Result<T> = std::result::Result<T, MoparError>;
