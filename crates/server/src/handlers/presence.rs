use axum::{extract::State, Json};
use pchat_common::LastSeen;
use tracing::debug;

use crate::config::AppState;
use crate::error::Result;
use crate::extract::ApiPath;

/// GET /user/lastseen/:id
pub async fn last_seen(
    ApiPath(user_id): ApiPath<String>,
    State(state): State<AppState>,
) -> Result<Json<LastSeen>> {
    debug!("GET /user/lastseen/{}", user_id);
    Ok(Json(state.sync.last_seen(&user_id).await?))
}
