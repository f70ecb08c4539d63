//! Error types for client operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by a [`ChatApi`](crate::api::ChatApi) call.
///
/// The server hides failure causes, so the kind is all a caller gets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transient failure: {0}")]
    Transient(String),
}

impl ClientError {
    /// Map a non-success HTTP status onto the error taxonomy.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            404 => ClientError::NotFound(context.to_string()),
            400 => ClientError::InvalidArgument(context.to_string()),
            _ => ClientError::Transient(format!("{} (HTTP {})", context, status)),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transient(err.to_string())
    }
}
