use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{MessageEntity, MessageId, RoomId},
    dto::format_system_time,
};

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: MessageId,
    pub sender_nickname: String,
    pub content: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<MessageEntity> for MessageDto {
    fn from(message: MessageEntity) -> Self {
        Self {
            id: message.id,
            sender_nickname: message.sender.nickname,
            content: message.content,
            created_at: format_system_time(message.created_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    pub room_id: RoomId,
    pub messages: Vec<MessageDto>,
}
