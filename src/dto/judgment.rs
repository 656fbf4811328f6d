use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{JudgmentEntity, RoomId},
    dto::format_system_time,
};

/// Final verdict of a closed room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgmentResponse {
    pub id: i64,
    pub room_id: RoomId,
    /// Nickname of the winning participant.
    pub winner: String,
    /// Nickname of the room creator.
    pub plaintiff: String,
    pub defendant: String,
    #[schema(minimum = 0, maximum = 100)]
    pub winner_logic_score: u8,
    #[schema(minimum = 0, maximum = 100)]
    pub winner_empathy_score: u8,
    pub judgment_comment: String,
    pub winner_reason: String,
    pub loser_reason: String,
    pub created_at: String,
}

impl From<JudgmentEntity> for JudgmentResponse {
    fn from(judgment: JudgmentEntity) -> Self {
        Self {
            id: judgment.id,
            room_id: judgment.room_id,
            winner: judgment.winner,
            plaintiff: judgment.plaintiff,
            defendant: judgment.defendant,
            winner_logic_score: judgment.winner_logic_score,
            winner_empathy_score: judgment.winner_empathy_score,
            judgment_comment: judgment.comment,
            winner_reason: judgment.winner_reason,
            loser_reason: judgment.loser_reason,
            created_at: format_system_time(judgment.created_at),
        }
    }
}
