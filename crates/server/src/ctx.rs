//! Request identity
//!
//! Authentication is an upstream concern. Requests arrive with the caller's
//! user id in the `x-user` header; the middleware only checks that the id is
//! known and stores a [`Ctx`] in the request extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::config::AppState;
use crate::error::{Error, Result};

pub const USER_HEADER: &str = "x-user";

#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: String,
}

impl Ctx {
    pub fn new(user_id: String) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::Unauthorized)
    }
}

pub async fn mw_require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let user_id = req
        .headers()
        .get(USER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .ok_or(Error::Unauthorized)?;

    if state.users.resolve(&user_id).await.is_err() {
        debug!("MIDDLEWARE: unknown user {}", user_id);
        return Err(Error::Unauthorized);
    }

    req.extensions_mut().insert(Ctx::new(user_id));
    Ok(next.run(req).await)
}
