use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomId,
    dto::room::{
        CreateRoomRequest, CreateRoomResponse, ExitDecisionRequest, ExitDecisionResponse,
        ExitRequestResponse, JoinRoomRequest, JoinRoomResponse,
    },
    error::AppError,
    routes::identity::CurrentUser,
    services::room_service,
    state::SharedState,
};

/// Room creation, joining and the exit workflow.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{id}/exit/request", post(request_exit))
        .route("/rooms/{id}/exit/decide", post(decide_exit))
}

/// Open a debate room; the caller becomes its first participant.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = CreateRoomResponse),
        (status = 400, description = "Invalid title"),
        (status = 401, description = "Missing identity headers")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<CreateRoomResponse>, AppError> {
    let room = room_service::create_room(&state, user, payload.title).await?;
    Ok(Json(room))
}

/// Enter a room with a participant or observer invite code.
#[utoipa::path(
    post,
    path = "/rooms/join",
    tag = "rooms",
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinRoomResponse),
        (status = 400, description = "Unknown invite code"),
        (status = 409, description = "Already joined or room full")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<JoinRoomResponse>, AppError> {
    let joined = room_service::join_room(&state, &payload.invite_code, user).await?;
    Ok(Json(joined))
}

/// Ask the opponent to end the debate.
#[utoipa::path(
    post,
    path = "/rooms/{id}/exit/request",
    tag = "rooms",
    params(("id" = i64, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Exit requested", body = ExitRequestResponse),
        (status = 403, description = "Observers cannot request an exit"),
        (status = 404, description = "Room unknown or caller not a member"),
        (status = 409, description = "Room closed or exit already pending")
    )
)]
pub async fn request_exit(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<ExitRequestResponse>, AppError> {
    let response = room_service::request_exit(&state, room_id, user).await?;
    Ok(Json(response))
}

/// Accept or reject the opponent's exit request.
#[utoipa::path(
    post,
    path = "/rooms/{id}/exit/decide",
    tag = "rooms",
    params(("id" = i64, Path, description = "Room identifier")),
    request_body = ExitDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = ExitDecisionResponse),
        (status = 403, description = "Requester or observer tried to decide"),
        (status = 404, description = "Room unknown or caller not a member"),
        (status = 409, description = "No pending exit request")
    )
)]
pub async fn decide_exit(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
    Valid(Json(payload)): Valid<Json<ExitDecisionRequest>>,
) -> Result<Json<ExitDecisionResponse>, AppError> {
    let response = room_service::decide_exit(&state, room_id, user, payload.approve).await?;
    Ok(Json(response))
}
