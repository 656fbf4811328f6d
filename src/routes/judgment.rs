use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dao::models::RoomId,
    dto::{judgment::JudgmentResponse, room::RetryJudgmentResponse},
    error::AppError,
    routes::identity::CurrentUser,
    services::{judgment_service, room_service},
    state::SharedState,
};

/// Verdict lookup and the manual re-trigger.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{id}/judgment", get(get_judgment))
        .route("/rooms/{id}/judgment/retry", post(retry_judgment))
}

/// Final verdict of a closed debate.
#[utoipa::path(
    get,
    path = "/rooms/{id}/judgment",
    tag = "judgment",
    params(("id" = i64, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Verdict", body = JudgmentResponse),
        (status = 404, description = "Room unknown, caller not a member, or no verdict yet")
    )
)]
pub async fn get_judgment(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<JudgmentResponse>, AppError> {
    let judgment = judgment_service::get_judgment(&state, room_id, &user).await?;
    Ok(Json(judgment))
}

/// Queue the verdict again for a room stuck in `EXIT_ACCEPTED`.
#[utoipa::path(
    post,
    path = "/rooms/{id}/judgment/retry",
    tag = "judgment",
    params(("id" = i64, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Retry submitted", body = RetryJudgmentResponse),
        (status = 409, description = "Room is not awaiting judgment")
    )
)]
pub async fn retry_judgment(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RetryJudgmentResponse>, AppError> {
    let response = room_service::retry_judgment(&state, room_id, user).await?;
    Ok(Json(response))
}
