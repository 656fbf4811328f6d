use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    JudgmentEntity, MemberRole, MembershipEntity, MessageEntity, RoomEntity, RoomId, RoomStatus,
    UserRef,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub id: RoomId,
    title: String,
    participant_code: String,
    observer_code: String,
    creator: UserRef,
    status: RoomStatus,
    exit_requester: Option<UserRef>,
    pub version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            participant_code: value.participant_code,
            observer_code: value.observer_code,
            creator: value.creator,
            status: value.status,
            exit_requester: value.exit_requester,
            version: value.version as i64,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
            participant_code: value.participant_code,
            observer_code: value.observer_code,
            creator: value.creator,
            status: value.status,
            exit_requester: value.exit_requester,
            version: value.version.max(0) as u64,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMembershipDocument {
    room_id: RoomId,
    user: UserRef,
    role: MemberRole,
    conviction_score: i32,
    joined_at: DateTime,
}

impl From<MembershipEntity> for MongoMembershipDocument {
    fn from(value: MembershipEntity) -> Self {
        Self {
            room_id: value.room_id,
            user: value.user,
            role: value.role,
            conviction_score: i32::from(value.conviction_score),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoMembershipDocument> for MembershipEntity {
    fn from(value: MongoMembershipDocument) -> Self {
        Self {
            room_id: value.room_id,
            user: value.user,
            role: value.role,
            conviction_score: clamp_score(value.conviction_score),
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessageDocument {
    #[serde(rename = "_id")]
    id: i64,
    room_id: RoomId,
    sender: UserRef,
    content: String,
    created_at: DateTime,
}

impl From<MessageEntity> for MongoMessageDocument {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            sender: value.sender,
            content: value.content,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoMessageDocument> for MessageEntity {
    fn from(value: MongoMessageDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            sender: value.sender,
            content: value.content,
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoJudgmentDocument {
    #[serde(rename = "_id")]
    id: i64,
    room_id: RoomId,
    winner: String,
    plaintiff: String,
    defendant: String,
    winner_logic_score: i32,
    winner_empathy_score: i32,
    comment: String,
    winner_reason: String,
    loser_reason: String,
    created_at: DateTime,
}

impl From<JudgmentEntity> for MongoJudgmentDocument {
    fn from(value: JudgmentEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            winner: value.winner,
            plaintiff: value.plaintiff,
            defendant: value.defendant,
            winner_logic_score: i32::from(value.winner_logic_score),
            winner_empathy_score: i32::from(value.winner_empathy_score),
            comment: value.comment,
            winner_reason: value.winner_reason,
            loser_reason: value.loser_reason,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoJudgmentDocument> for JudgmentEntity {
    fn from(value: MongoJudgmentDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            winner: value.winner,
            plaintiff: value.plaintiff,
            defendant: value.defendant,
            winner_logic_score: clamp_score(value.winner_logic_score),
            winner_empathy_score: clamp_score(value.winner_empathy_score),
            comment: value.comment,
            winner_reason: value.winner_reason,
            loser_reason: value.loser_reason,
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Monotonic id sequence stored in the `counters` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCounterDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}

fn clamp_score(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

pub fn doc_id(id: i64) -> Document {
    doc! {"_id": id}
}

pub fn membership_filter(room_id: RoomId, user_id: i64) -> Document {
    doc! {"room_id": room_id, "user.id": user_id}
}
