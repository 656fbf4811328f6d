use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use utoipa::ToSchema;

/// Identifier of a debate room, assigned by the durable store.
pub type RoomId = i64;
/// Identifier of a message; strictly increasing with creation time.
pub type MessageId = i64;
/// Identifier of a user, owned by the external identity provider.
pub type UserId = i64;

/// Conviction score every participant starts with.
pub const DEFAULT_CONVICTION_SCORE: u8 = 50;

/// Reference to an externally managed user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserRef {
    /// Identifier issued by the identity provider.
    pub id: UserId,
    /// Display name shown to other members.
    pub nickname: String,
}

impl UserRef {
    /// Reference to user `id` shown as `nickname`.
    pub fn new(id: UserId, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
        }
    }
}

/// Lifecycle of a debate room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    /// Debate is running and accepts messages.
    Alive,
    /// A participant asked to close the debate and waits for the other side.
    ExitRequested,
    /// Both sides agreed to close; the verdict is pending.
    ExitAccepted,
    /// Verdict written; the room is frozen.
    Closed,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoomStatus::Alive => "ALIVE",
            RoomStatus::ExitRequested => "EXIT_REQUESTED",
            RoomStatus::ExitAccepted => "EXIT_ACCEPTED",
            RoomStatus::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

/// Role granted to a room member by the invite code they used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    /// Debates: sends messages and takes part in the exit workflow.
    Participant,
    /// Reads and polls only.
    Observer,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberRole::Participant => "PARTICIPANT",
            MemberRole::Observer => "OBSERVER",
        })
    }
}

/// Debate room as persisted by the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Store-assigned identifier.
    pub id: RoomId,
    /// Title shown to members.
    pub title: String,
    /// Invite code granting the participant role.
    pub participant_code: String,
    /// Invite code granting the observer role.
    pub observer_code: String,
    /// User who opened the room; argues as plaintiff.
    pub creator: UserRef,
    /// Current lifecycle state.
    pub status: RoomStatus,
    /// Set only while `status == ExitRequested`.
    pub exit_requester: Option<UserRef>,
    /// Optimistic concurrency counter, bumped by every successful save.
    pub version: u64,
    /// When the room was opened.
    pub created_at: SystemTime,
    /// Last successful save.
    pub updated_at: SystemTime,
}

/// Fields required to create a room; the store assigns the identifier.
#[derive(Debug, Clone)]
pub struct NewRoom {
    /// Title shown to members.
    pub title: String,
    /// Invite code granting the participant role.
    pub participant_code: String,
    /// Invite code granting the observer role.
    pub observer_code: String,
    /// User opening the room.
    pub creator: UserRef,
}

/// Membership of a user in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipEntity {
    /// Room joined.
    pub room_id: RoomId,
    /// Member.
    pub user: UserRef,
    /// Role granted by the invite code used.
    pub role: MemberRole,
    /// 0..=100, meaningful for participants only.
    pub conviction_score: u8,
    /// When the membership was created.
    pub joined_at: SystemTime,
}

impl MembershipEntity {
    /// Fresh membership with the starting conviction score.
    pub fn new(room_id: RoomId, user: UserRef, role: MemberRole) -> Self {
        Self {
            room_id,
            user,
            role,
            conviction_score: DEFAULT_CONVICTION_SCORE,
            joined_at: SystemTime::now(),
        }
    }

    /// Whether the member debates rather than observes.
    pub fn is_participant(&self) -> bool {
        self.role == MemberRole::Participant
    }
}

/// Immutable chat message, carrying the sender nickname so delta reads need no lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntity {
    /// Store-assigned, increasing identifier.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Participant who wrote it.
    pub sender: UserRef,
    /// Trimmed message text.
    pub content: String,
    /// When the store accepted it.
    pub created_at: SystemTime,
}

/// Fields required to append a message; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Participant writing it.
    pub sender: UserRef,
    /// Trimmed message text.
    pub content: String,
}

/// Final verdict of a debate. At most one exists per room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JudgmentEntity {
    /// Store-assigned identifier.
    pub id: i64,
    /// Judged room.
    pub room_id: RoomId,
    /// Nickname of the winning participant.
    pub winner: String,
    /// Nickname of the room creator.
    pub plaintiff: String,
    /// Nickname of the other participant.
    pub defendant: String,
    /// Winner's logic score, 0 to 100.
    pub winner_logic_score: u8,
    /// Winner's empathy score, 0 to 100.
    pub winner_empathy_score: u8,
    /// Overall remarks of the judge.
    pub comment: String,
    /// Why the winner won.
    pub winner_reason: String,
    /// Why the loser lost.
    pub loser_reason: String,
    /// When the verdict was stored.
    pub created_at: SystemTime,
}

/// Verdict payload handed to the store, which assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewJudgment {
    /// Judged room.
    pub room_id: RoomId,
    /// Nickname of the winning participant.
    pub winner: String,
    /// Nickname of the room creator.
    pub plaintiff: String,
    /// Nickname of the other participant.
    pub defendant: String,
    /// Winner's logic score, 0 to 100.
    pub winner_logic_score: u8,
    /// Winner's empathy score, 0 to 100.
    pub winner_empathy_score: u8,
    /// Overall remarks of the judge.
    pub comment: String,
    /// Why the winner won.
    pub winner_reason: String,
    /// Why the loser lost.
    pub loser_reason: String,
}
