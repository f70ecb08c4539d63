//! Body and path extractors that fail with [`Error`].
//!
//! axum's own `Json` and `Path` reject with plain-text parse details and
//! 422/400. These wrappers turn any rejection into `InvalidArgument`, so a
//! malformed request gets the same generic body as every other failure.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::request::Parts,
    Json,
};
use tracing::warn;

use crate::error::{Error, Result};

/// JSON request body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!("[Extract] Rejected body: {}", rejection.body_text());
                Err(Error::InvalidArgument(rejection.body_text()))
            }
        }
    }
}

/// Path parameters.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!("[Extract] Rejected path {}: {}", parts.uri.path(), rejection.body_text());
                Err(Error::InvalidArgument(rejection.body_text()))
            }
        }
    }
}
