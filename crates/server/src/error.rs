use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the log, the directory and the endpoint built on them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transient failure: {0}")]
    Transient(String),

    // Raised by the auth middleware only
    #[error("unauthorized")]
    Unauthorized,
}

pub type Result<T> = core::result::Result<T, Error>;

/// The only message a client ever sees. Causes stay in the server log.
pub const GENERIC_FAILURE: &str = "Could not complete request";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = Json(json!({
            "error": {
                "message": GENERIC_FAILURE
            }
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Transient(err.to_string())
    }
}
