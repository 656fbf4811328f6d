use tracing::debug;

use crate::{
    dao::models::{NewMessage, RoomId, RoomStatus, UserRef},
    dto::message::{MAX_MESSAGE_CHARS, MessageDto, MessageListResponse},
    error::ServiceError,
    services::{
        judgment_pool::JudgmentJob,
        membership::{require_member, require_participant, require_room},
    },
    state::SharedState,
};

/// Append a participant's message to a running debate.
pub async fn send_message(
    state: &SharedState,
    room_id: RoomId,
    sender: UserRef,
    content: &str,
) -> Result<MessageDto, ServiceError> {
    let store = state.store();
    let room = require_room(store, room_id).await?;
    if room.status == RoomStatus::Closed {
        return Err(ServiceError::RoomClosed(room_id));
    }

    let membership = require_member(store, room_id, sender.id).await?;
    require_participant(&membership)?;

    let content = validate_content(content)?;
    let message = store
        .insert_message(NewMessage {
            room_id,
            sender: membership.user,
            content,
        })
        .await?;

    state.cache().set_last_message_id(room_id, message.id).await;
    debug!(room_id, message_id = message.id, "message stored");

    if state.config().judgment.interim_scoring {
        state.judgments().submit(JudgmentJob::rescore(room_id));
    }

    Ok(message.into())
}

/// Full message history of a room, oldest first.
pub async fn list_messages(
    state: &SharedState,
    room_id: RoomId,
    user: &UserRef,
) -> Result<MessageListResponse, ServiceError> {
    let store = state.store();
    require_member(store, room_id, user.id).await?;

    let messages = store.messages_after(room_id, 0).await?;
    Ok(MessageListResponse {
        room_id,
        messages: messages.into_iter().map(MessageDto::from).collect(),
    })
}

fn validate_content(content: &str) -> Result<String, ServiceError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ServiceError::InvalidInput(
            "message content must not be blank".into(),
        ));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "message content exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content.to_owned())
}
