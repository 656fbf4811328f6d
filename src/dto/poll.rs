use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    dao::models::{MessageId, RoomStatus},
    dto::message::MessageDto,
};

/// Query string of the poll endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    /// Highest message id the client already holds; omit on the first poll.
    pub last_message_id: Option<MessageId>,
}

/// Everything a client needs to refresh a room view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// Messages newer than the requested id, ascending.
    pub messages: Vec<MessageDto>,
    pub status: RoomStatus,
    pub finish_requester_nickname: Option<String>,
    /// Conviction score per participant nickname.
    pub percent: BTreeMap<String, u8>,
}
