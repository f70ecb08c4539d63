//! Chat handlers
//!
//! JSON over plain request/response. Clients poll `since` and `timestamp`;
//! everything else is occasional.

use axum::{extract::State, response::Json};
use pchat_common::{
    CheckpointRequest, ConversationRef, ConversationSummary, JoinRoomRequest, LeaveRequest,
    Message, PostRequest, PostResponse, PublicRoom, StartImRequest, StatusResponse, Timestamp,
    TimestampResponse,
};
use tracing::{debug, info};

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};

/// GET /chat/summary
pub async fn summary(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<ConversationSummary>>> {
    debug!("GET /chat/summary for {}", ctx.user_id());
    Ok(Json(state.sync.summary(ctx.user_id()).await?))
}

/// POST /chat/im/new
pub async fn start_im(
    State(state): State<AppState>,
    ctx: Ctx,
    ApiJson(req): ApiJson<StartImRequest>,
) -> Result<Json<ConversationRef>> {
    info!("POST /chat/im/new {} -> {}", ctx.user_id(), req.username);
    let conversation_id = state.sync.start_im(ctx.user_id(), &req.username).await?;
    Ok(Json(ConversationRef { conversation_id }))
}

/// POST /chat/room/join
pub async fn join_room(
    State(state): State<AppState>,
    ctx: Ctx,
    ApiJson(req): ApiJson<JoinRoomRequest>,
) -> Result<Json<ConversationRef>> {
    info!("POST /chat/room/join {} -> {}", ctx.user_id(), req.room_name);
    let conversation_id = state
        .sync
        .join_room(ctx.user_id(), &req.room_name, req.public)
        .await?;
    Ok(Json(ConversationRef { conversation_id }))
}

/// GET /chat/tryroom/:name
pub async fn try_room(
    ApiPath(name): ApiPath<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ConversationRef>> {
    info!("GET /chat/tryroom/{} for {}", name, ctx.user_id());
    let conversation_id = state.sync.try_room(ctx.user_id(), &name).await?;
    Ok(Json(ConversationRef { conversation_id }))
}

/// GET /chat/roomlist
pub async fn room_list(State(state): State<AppState>) -> Json<Vec<PublicRoom>> {
    Json(state.sync.public_rooms().await)
}

/// GET /chat/recent/:id
pub async fn recent(
    ApiPath(conversation_id): ApiPath<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<Message>>> {
    debug!("GET /chat/recent/{}", conversation_id);
    Ok(Json(state.sync.recent(ctx.user_id(), &conversation_id).await?))
}

/// GET /chat/since/:id/:timestamp
pub async fn since(
    ApiPath((conversation_id, after)): ApiPath<(String, Timestamp)>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<Message>>> {
    debug!("GET /chat/since/{}/{}", conversation_id, after);
    Ok(Json(
        state
            .sync
            .since(ctx.user_id(), &conversation_id, after)
            .await?,
    ))
}

/// POST /chat/add
pub async fn add(
    State(state): State<AppState>,
    ctx: Ctx,
    ApiJson(req): ApiJson<PostRequest>,
) -> Result<Json<PostResponse>> {
    info!("POST /chat/add {} in {}", ctx.user_id(), req.conversation_id);
    let timestamp = state.sync.post(ctx.user_id(), req).await?;
    Ok(Json(PostResponse {
        status: "ok".to_string(),
        timestamp,
    }))
}

/// POST /chat/leave
pub async fn leave(
    State(state): State<AppState>,
    ctx: Ctx,
    ApiJson(req): ApiJson<LeaveRequest>,
) -> Result<Json<StatusResponse>> {
    info!("POST /chat/leave {} from {}", ctx.user_id(), req.conversation_id);
    state.sync.leave(ctx.user_id(), &req.conversation_id).await?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /chat/checkpoint
pub async fn checkpoint(
    State(state): State<AppState>,
    ctx: Ctx,
    ApiJson(req): ApiJson<CheckpointRequest>,
) -> Result<Json<StatusResponse>> {
    info!(
        "POST /chat/checkpoint {} in {} at {}",
        ctx.user_id(),
        req.conversation_id,
        req.checkpoint
    );
    state
        .sync
        .set_checkpoint(ctx.user_id(), &req.conversation_id, req.checkpoint)
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// GET /chat/timestamp/:id
pub async fn timestamp(
    ApiPath(conversation_id): ApiPath<String>,
    State(state): State<AppState>,
) -> Result<Json<TimestampResponse>> {
    let timestamp = state.sync.latest_timestamp(&conversation_id).await?;
    Ok(Json(TimestampResponse { timestamp }))
}

/// GET /chat/info/:id
pub async fn info(
    ApiPath(conversation_id): ApiPath<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ConversationSummary>> {
    Ok(Json(
        state.sync.chat_info(ctx.user_id(), &conversation_id).await?,
    ))
}
