//! In-process implementation of [`DebateStore`], used by tests and single-node runs
//! without a database.

use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use futures::future::{self, BoxFuture};
use tokio::sync::Mutex;

use crate::dao::{
    debate_store::DebateStore,
    models::{
        JudgmentEntity, MembershipEntity, MessageEntity, MessageId, NewJudgment, NewMessage,
        NewRoom, RoomEntity, RoomId, RoomStatus, UserId,
    },
    storage::{StorageError, StorageResult},
};

/// Tables held behind one async mutex.
#[derive(Clone, Default)]
pub struct MemoryDebateStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    next_room_id: RoomId,
    next_message_id: MessageId,
    next_judgment_id: i64,
    rooms: BTreeMap<RoomId, RoomEntity>,
    // Keyed by (room, join sequence) so listing keeps join order.
    memberships: BTreeMap<(RoomId, u64), MembershipEntity>,
    next_membership_seq: u64,
    messages: BTreeMap<MessageId, MessageEntity>,
    judgments: BTreeMap<RoomId, JudgmentEntity>,
}

impl Tables {
    fn membership_mut(&mut self, room_id: RoomId, user_id: UserId) -> Option<&mut MembershipEntity> {
        self.memberships
            .range_mut((room_id, 0)..=(room_id, u64::MAX))
            .map(|(_, membership)| membership)
            .find(|membership| membership.user.id == user_id)
    }

    fn room_memberships(&self, room_id: RoomId) -> impl Iterator<Item = &MembershipEntity> {
        self.memberships
            .range((room_id, 0)..=(room_id, u64::MAX))
            .map(|(_, membership)| membership)
    }
}

impl MemoryDebateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn run<T, F>(&self, work: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Tables) -> StorageResult<T> + Send + 'static,
    {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.lock().await;
            work(&mut guard)
        })
    }
}

impl DebateStore for MemoryDebateStore {
    fn create_room(&self, room: NewRoom) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        self.run(move |tables| {
            let code_taken = tables.rooms.values().any(|existing| {
                [&existing.participant_code, &existing.observer_code]
                    .iter()
                    .any(|code| **code == room.participant_code || **code == room.observer_code)
            });
            if code_taken {
                return Err(StorageError::duplicate("invite code", room.participant_code));
            }

            tables.next_room_id += 1;
            let now = SystemTime::now();
            let entity = RoomEntity {
                id: tables.next_room_id,
                title: room.title,
                participant_code: room.participant_code,
                observer_code: room.observer_code,
                creator: room.creator,
                status: RoomStatus::Alive,
                exit_requester: None,
                version: 0,
                created_at: now,
                updated_at: now,
            };
            tables.rooms.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn find_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        self.run(move |tables| Ok(tables.rooms.get(&id).cloned()))
    }

    fn find_room_by_invite_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        self.run(move |tables| {
            Ok(tables
                .rooms
                .values()
                .find(|room| room.participant_code == code || room.observer_code == code)
                .cloned())
        })
    }

    fn save_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        self.run(move |tables| {
            let stored = tables
                .rooms
                .get_mut(&room.id)
                .filter(|stored| stored.version == expected_version)
                .ok_or(StorageError::VersionConflict {
                    room_id: room.id,
                    expected: expected_version,
                })?;

            let mut updated = room;
            updated.version = expected_version + 1;
            updated.updated_at = SystemTime::now();
            *stored = updated.clone();
            Ok(updated)
        })
    }

    fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<MembershipEntity>>> {
        self.run(move |tables| {
            Ok(tables
                .room_memberships(room_id)
                .find(|membership| membership.user.id == user_id)
                .cloned())
        })
    }

    fn save_membership(&self, membership: MembershipEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            if tables
                .membership_mut(membership.room_id, membership.user.id)
                .is_some()
            {
                return Err(StorageError::duplicate(
                    "membership",
                    format!("room {} / user {}", membership.room_id, membership.user.id),
                ));
            }

            tables.next_membership_seq += 1;
            let key = (membership.room_id, tables.next_membership_seq);
            tables.memberships.insert(key, membership);
            Ok(())
        })
    }

    fn list_memberships(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MembershipEntity>>> {
        self.run(move |tables| Ok(tables.room_memberships(room_id).cloned().collect()))
    }

    fn count_other_participants(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.run(move |tables| {
            Ok(tables
                .room_memberships(room_id)
                .filter(|membership| membership.is_participant() && membership.user.id != user_id)
                .count() as u64)
        })
    }

    fn update_conviction_scores(
        &self,
        room_id: RoomId,
        scores: Vec<(UserId, u8)>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            for (user_id, score) in scores {
                if let Some(membership) = tables.membership_mut(room_id, user_id) {
                    membership.conviction_score = score.min(100);
                }
            }
            Ok(())
        })
    }

    fn insert_message(&self, message: NewMessage) -> BoxFuture<'static, StorageResult<MessageEntity>> {
        self.run(move |tables| {
            tables.next_message_id += 1;
            let entity = MessageEntity {
                id: tables.next_message_id,
                room_id: message.room_id,
                sender: message.sender,
                content: message.content,
                created_at: SystemTime::now(),
            };
            tables.messages.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn messages_after(
        &self,
        room_id: RoomId,
        after: MessageId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        self.run(move |tables| {
            let start = after.saturating_add(1).max(0);
            Ok(tables
                .messages
                .range(start..)
                .map(|(_, message)| message)
                .filter(|message| message.room_id == room_id)
                .cloned()
                .collect())
        })
    }

    fn judgment_exists(&self, room_id: RoomId) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(move |tables| Ok(tables.judgments.contains_key(&room_id)))
    }

    fn insert_judgment(
        &self,
        judgment: NewJudgment,
    ) -> BoxFuture<'static, StorageResult<JudgmentEntity>> {
        self.run(move |tables| {
            if tables.judgments.contains_key(&judgment.room_id) {
                return Err(StorageError::duplicate(
                    "judgment",
                    format!("room {}", judgment.room_id),
                ));
            }

            tables.next_judgment_id += 1;
            let entity = JudgmentEntity {
                id: tables.next_judgment_id,
                room_id: judgment.room_id,
                winner: judgment.winner,
                plaintiff: judgment.plaintiff,
                defendant: judgment.defendant,
                winner_logic_score: judgment.winner_logic_score,
                winner_empathy_score: judgment.winner_empathy_score,
                comment: judgment.comment,
                winner_reason: judgment.winner_reason,
                loser_reason: judgment.loser_reason,
                created_at: SystemTime::now(),
            };
            tables.judgments.insert(entity.room_id, entity.clone());
            Ok(entity)
        })
    }

    fn find_judgment(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<JudgmentEntity>>> {
        self.run(move |tables| Ok(tables.judgments.get(&room_id).cloned()))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{MemberRole, UserRef};

    fn new_room(code: &str) -> NewRoom {
        NewRoom {
            title: "room".into(),
            participant_code: format!("{code}-0001"),
            observer_code: format!("{code}-0002"),
            creator: UserRef::new(1, "alice"),
        }
    }

    #[tokio::test]
    async fn save_room_rejects_stale_version() {
        let store = MemoryDebateStore::new();
        let room = store.create_room(new_room("1111")).await.unwrap();

        let mut first = room.clone();
        first.status = RoomStatus::ExitRequested;
        let saved = store.save_room(first, room.version).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = store.save_room(room.clone(), room.version).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn messages_after_is_scoped_and_ordered() {
        let store = MemoryDebateStore::new();
        let a = store.create_room(new_room("1111")).await.unwrap();
        let b = store.create_room(new_room("2222")).await.unwrap();
        let sender = UserRef::new(1, "alice");

        for (room, text) in [(a.id, "a1"), (b.id, "b1"), (a.id, "a2"), (a.id, "a3")] {
            store
                .insert_message(NewMessage {
                    room_id: room,
                    sender: sender.clone(),
                    content: text.into(),
                })
                .await
                .unwrap();
        }

        let all: Vec<_> = store
            .messages_after(a.id, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.content)
            .collect();
        assert_eq!(all, vec!["a1", "a2", "a3"]);

        let delta = store.messages_after(a.id, 3).await.unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].content, "a3");
    }

    #[tokio::test]
    async fn membership_is_unique_per_room_and_user() {
        let store = MemoryDebateStore::new();
        let room = store.create_room(new_room("1111")).await.unwrap();
        let alice = UserRef::new(1, "alice");

        store
            .save_membership(MembershipEntity::new(room.id, alice.clone(), MemberRole::Participant))
            .await
            .unwrap();
        let err = store
            .save_membership(MembershipEntity::new(room.id, alice, MemberRole::Observer))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn only_one_judgment_per_room() {
        let store = MemoryDebateStore::new();
        let judgment = NewJudgment {
            room_id: 7,
            winner: "alice".into(),
            plaintiff: "alice".into(),
            defendant: "bob".into(),
            winner_logic_score: 80,
            winner_empathy_score: 70,
            comment: String::new(),
            winner_reason: String::new(),
            loser_reason: String::new(),
        };

        store.insert_judgment(judgment.clone()).await.unwrap();
        assert!(store.judgment_exists(7).await.unwrap());
        assert!(store.insert_judgment(judgment).await.is_err());
    }
}
