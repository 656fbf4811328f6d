use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::{MemberRole, RoomEntity, RoomId, RoomStatus};

/// Payload used to open a new debate room.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Optional title; a dated default is generated when omitted.
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
}

/// Created room with the two invite codes to share.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub title: String,
    /// Grants the participant role to the opponent.
    #[schema(example = "1234-5678")]
    pub participant_code: String,
    /// Grants the observer role.
    #[schema(example = "8765-4321")]
    pub observer_code: String,
}

impl From<RoomEntity> for CreateRoomResponse {
    fn from(room: RoomEntity) -> Self {
        Self {
            room_id: room.id,
            title: room.title,
            participant_code: room.participant_code,
            observer_code: room.observer_code,
        }
    }
}

/// Payload used to enter a room with an invite code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "1234-5678")]
    pub invite_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub room_id: RoomId,
    pub title: String,
    pub role: MemberRole,
}

/// Room status after an exit request was recorded.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitRequestResponse {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub requester_nickname: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExitDecisionRequest {
    /// `true` closes the debate and starts the judgment, `false` resumes it.
    pub approve: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitDecisionResponse {
    pub room_id: RoomId,
    pub approved: bool,
    pub status: RoomStatus,
}

/// Outcome of a manual judgment re-trigger.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryJudgmentResponse {
    pub room_id: RoomId,
    /// `false` when the judgment queue was full and the job was dropped.
    pub queued: bool,
}
