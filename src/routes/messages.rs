use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomId,
    dto::{
        message::{MessageDto, MessageListResponse, SendMessageRequest},
        poll::{PollQuery, PollResponse},
    },
    error::AppError,
    routes::identity::CurrentUser,
    services::{message_service, poll_service},
    state::SharedState,
};

/// Chat endpoints: sending, full history and the incremental poll.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/rooms/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/rooms/{id}/poll", get(poll))
}

/// Post a message to a running debate.
#[utoipa::path(
    post,
    path = "/rooms/{id}/messages",
    tag = "messages",
    params(("id" = i64, Path, description = "Room identifier")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored", body = MessageDto),
        (status = 400, description = "Blank or oversized content"),
        (status = 403, description = "Observers cannot post"),
        (status = 404, description = "Room unknown or caller not a member"),
        (status = 409, description = "Room closed")
    )
)]
pub async fn send_message(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
    Valid(Json(payload)): Valid<Json<SendMessageRequest>>,
) -> Result<Json<MessageDto>, AppError> {
    let message = message_service::send_message(&state, room_id, user, &payload.content).await?;
    Ok(Json(message))
}

/// Full transcript of the room, oldest first.
#[utoipa::path(
    get,
    path = "/rooms/{id}/messages",
    tag = "messages",
    params(("id" = i64, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room transcript", body = MessageListResponse),
        (status = 404, description = "Room unknown or caller not a member")
    )
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<MessageListResponse>, AppError> {
    let messages = message_service::list_messages(&state, room_id, &user).await?;
    Ok(Json(messages))
}

/// New messages, status and conviction scores since `lastMessageId`.
#[utoipa::path(
    get,
    path = "/rooms/{id}/poll",
    tag = "messages",
    params(("id" = i64, Path, description = "Room identifier"), PollQuery),
    responses(
        (status = 200, description = "Room delta", body = PollResponse),
        (status = 404, description = "Room unknown or caller not a member")
    )
)]
pub async fn poll(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, AppError> {
    let response = poll_service::poll(&state, room_id, query.last_message_id, &user).await?;
    Ok(Json(response))
}
