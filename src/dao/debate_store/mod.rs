pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    JudgmentEntity, MembershipEntity, MessageEntity, MessageId, NewJudgment, NewMessage, NewRoom,
    RoomEntity, RoomId, UserId,
};
use crate::dao::storage::StorageResult;

pub use memory::MemoryDebateStore;

/// Abstraction over the authoritative persistence layer for rooms, members, messages and verdicts.
pub trait DebateStore: Send + Sync {
    /// Insert a new room in the `Alive` state and return it with its assigned id.
    fn create_room(&self, room: NewRoom) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Room by id.
    fn find_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Resolve either invite code (participant or observer) to its room.
    fn find_room_by_invite_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Persist `room` if the stored copy is still at `expected_version`; the stored
    /// version becomes `expected_version + 1`.
    fn save_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Membership of `user_id` in the room, if any.
    fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<MembershipEntity>>>;
    /// Insert a membership, rejecting a second row for the same (room, user).
    fn save_membership(&self, membership: MembershipEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// All memberships of a room ordered by join time.
    fn list_memberships(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MembershipEntity>>>;
    /// Number of participant memberships in the room belonging to someone other than `user_id`.
    fn count_other_participants(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Overwrite the conviction score of each listed member.
    fn update_conviction_scores(
        &self,
        room_id: RoomId,
        scores: Vec<(UserId, u8)>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append a message, assigning the next id and the creation timestamp.
    fn insert_message(&self, message: NewMessage) -> BoxFuture<'static, StorageResult<MessageEntity>>;
    /// Messages of the room with `id > after`, ascending by id.
    fn messages_after(
        &self,
        room_id: RoomId,
        after: MessageId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>>;
    /// Whether the room already has a verdict.
    fn judgment_exists(&self, room_id: RoomId) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert the verdict, rejecting a second verdict for the same room.
    fn insert_judgment(
        &self,
        judgment: NewJudgment,
    ) -> BoxFuture<'static, StorageResult<JudgmentEntity>>;
    /// Verdict of the room, if written.
    fn find_judgment(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<JudgmentEntity>>>;
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
