use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoCounterDocument, MongoJudgmentDocument, MongoMembershipDocument,
        MongoMessageDocument, MongoRoomDocument, doc_id, membership_filter,
    },
};
use crate::dao::{
    debate_store::DebateStore,
    models::{
        JudgmentEntity, MemberRole, MembershipEntity, MessageEntity, MessageId, NewJudgment,
        NewMessage, NewRoom, RoomEntity, RoomId, RoomStatus, UserId,
    },
    storage::StorageResult,
};

const ROOMS: &str = "rooms";
const MEMBERSHIPS: &str = "memberships";
const MESSAGES: &str = "messages";
const JUDGMENTS: &str = "judgments";
const COUNTERS: &str = "counters";

/// [`DebateStore`] over the `rooms`, `memberships`, `messages`, `judgments` and
/// `counters` collections.
#[derive(Clone)]
pub struct MongoDebateStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = open_database(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoDebateStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = open_database(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document); 4] = [
            (ROOMS, "participant_code", doc! {"participant_code": 1}),
            (ROOMS, "observer_code", doc! {"observer_code": 1}),
            (MEMBERSHIPS, "room_id,user.id", doc! {"room_id": 1, "user.id": 1}),
            (JUDGMENTS, "room_id", doc! {"room_id": 1}),
        ];

        for (collection, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(Some(true)).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        // Delta reads scan messages of one room by ascending id.
        let model = IndexModel::builder()
            .keys(doc! {"room_id": 1, "_id": 1})
            .build();
        database
            .collection::<Document>(MESSAGES)
            .create_index(model)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MESSAGES,
                index: "room_id,_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOMS)
    }

    async fn memberships(&self) -> Collection<MongoMembershipDocument> {
        self.database().await.collection(MEMBERSHIPS)
    }

    async fn messages(&self) -> Collection<MongoMessageDocument> {
        self.database().await.collection(MESSAGES)
    }

    async fn judgments(&self) -> Collection<MongoJudgmentDocument> {
        self.database().await.collection(JUDGMENTS)
    }

    /// Atomically advance the named sequence and return its new value.
    async fn next_sequence(&self, name: &'static str) -> MongoResult<i64> {
        let counters = self
            .database()
            .await
            .collection::<MongoCounterDocument>(COUNTERS);

        let counter = counters
            .find_one_and_update(doc! {"_id": name}, doc! {"$inc": {"seq": 1_i64}})
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query("advance sequence", COUNTERS))?
            .ok_or(MongoDaoError::Sequence { name })?;

        Ok(counter.seq)
    }

    async fn create_room(&self, room: NewRoom) -> MongoResult<RoomEntity> {
        let id = self.next_sequence(ROOMS).await?;
        let now = SystemTime::now();
        let entity = RoomEntity {
            id,
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

        let document: MongoRoomDocument = entity.clone().into();
        self.rooms()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::Duplicate {
                        entity: "invite code",
                        key: entity.participant_code.clone(),
                    }
                } else {
                    MongoDaoError::query("insert room", ROOMS)(source)
                }
            })?;

        Ok(entity)
    }

    async fn find_room(&self, id: RoomId) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(MongoDaoError::query("load room", ROOMS))?;
        Ok(document.map(Into::into))
    }

    async fn find_room_by_invite_code(&self, code: String) -> MongoResult<Option<RoomEntity>> {
        let filter = doc! {"$or": [{"participant_code": &code}, {"observer_code": &code}]};
        let document = self
            .rooms()
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::query("resolve invite code", ROOMS))?;
        Ok(document.map(Into::into))
    }

    async fn save_room(&self, room: RoomEntity, expected_version: u64) -> MongoResult<RoomEntity> {
        let room_id = room.id;
        let mut updated = room;
        updated.version = expected_version + 1;
        updated.updated_at = SystemTime::now();

        let document: MongoRoomDocument = updated.clone().into();
        let result = self
            .rooms()
            .await
            .replace_one(
                doc! {"_id": room_id, "version": expected_version as i64},
                &document,
            )
            .await
            .map_err(MongoDaoError::query("save room", ROOMS))?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionConflict {
                room_id,
                expected: expected_version,
            });
        }

        Ok(updated)
    }

    async fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> MongoResult<Option<MembershipEntity>> {
        let document = self
            .memberships()
            .await
            .find_one(membership_filter(room_id, user_id))
            .await
            .map_err(MongoDaoError::query("load membership", MEMBERSHIPS))?;
        Ok(document.map(Into::into))
    }

    async fn save_membership(&self, membership: MembershipEntity) -> MongoResult<()> {
        let key = format!("room {} / user {}", membership.room_id, membership.user.id);
        let document: MongoMembershipDocument = membership.into();
        self.memberships()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::Duplicate {
                        entity: "membership",
                        key,
                    }
                } else {
                    MongoDaoError::query("insert membership", MEMBERSHIPS)(source)
                }
            })?;
        Ok(())
    }

    async fn list_memberships(&self, room_id: RoomId) -> MongoResult<Vec<MembershipEntity>> {
        let documents: Vec<MongoMembershipDocument> = self
            .memberships()
            .await
            .find(doc! {"room_id": room_id})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(MongoDaoError::query("list memberships", MEMBERSHIPS))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query("list memberships", MEMBERSHIPS))?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn count_other_participants(&self, room_id: RoomId, user_id: UserId) -> MongoResult<u64> {
        self.memberships()
            .await
            .count_documents(doc! {
                "room_id": room_id,
                "role": MemberRole::Participant.to_string(),
                "user.id": {"$ne": user_id},
            })
            .await
            .map_err(MongoDaoError::query("count participants", MEMBERSHIPS))
    }

    async fn update_conviction_scores(
        &self,
        room_id: RoomId,
        scores: Vec<(UserId, u8)>,
    ) -> MongoResult<()> {
        let memberships = self.memberships().await;
        for (user_id, score) in scores {
            memberships
                .update_one(
                    membership_filter(room_id, user_id),
                    doc! {"$set": {"conviction_score": i32::from(score.min(100))}},
                )
                .await
                .map_err(MongoDaoError::query("update conviction score", MEMBERSHIPS))?;
        }
        Ok(())
    }

    async fn insert_message(&self, message: NewMessage) -> MongoResult<MessageEntity> {
        let id = self.next_sequence(MESSAGES).await?;
        let entity = MessageEntity {
            id,
            room_id: message.room_id,
            sender: message.sender,
            content: message.content,
            created_at: SystemTime::now(),
        };

        let document: MongoMessageDocument = entity.clone().into();
        self.messages()
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::query("insert message", MESSAGES))?;

        Ok(entity)
    }

    async fn messages_after(
        &self,
        room_id: RoomId,
        after: MessageId,
    ) -> MongoResult<Vec<MessageEntity>> {
        let documents: Vec<MongoMessageDocument> = self
            .messages()
            .await
            .find(doc! {"room_id": room_id, "_id": {"$gt": after}})
            .sort(doc! {"_id": 1})
            .await
            .map_err(MongoDaoError::query("load messages", MESSAGES))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query("load messages", MESSAGES))?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn judgment_exists(&self, room_id: RoomId) -> MongoResult<bool> {
        let count = self
            .judgments()
            .await
            .count_documents(doc! {"room_id": room_id})
            .limit(1)
            .await
            .map_err(MongoDaoError::query("check judgment", JUDGMENTS))?;
        Ok(count > 0)
    }

    async fn insert_judgment(&self, judgment: NewJudgment) -> MongoResult<JudgmentEntity> {
        let id = self.next_sequence(JUDGMENTS).await?;
        let entity = JudgmentEntity {
            id,
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

        let document: MongoJudgmentDocument = entity.clone().into();
        self.judgments()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::Duplicate {
                        entity: "judgment",
                        key: format!("room {}", entity.room_id),
                    }
                } else {
                    MongoDaoError::query("insert judgment", JUDGMENTS)(source)
                }
            })?;

        Ok(entity)
    }

    async fn find_judgment(&self, room_id: RoomId) -> MongoResult<Option<JudgmentEntity>> {
        let document = self
            .judgments()
            .await
            .find_one(doc! {"room_id": room_id})
            .await
            .map_err(MongoDaoError::query("load judgment", JUDGMENTS))?;
        Ok(document.map(Into::into))
    }

    async fn health_check(&self) -> MongoResult<()> {
        if self.inner.ping().await.is_ok() {
            return Ok(());
        }
        self.inner.reconnect().await?;
        self.inner.ping().await
    }
}

impl DebateStore for MongoDebateStore {
    fn create_room(&self, room: NewRoom) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(id).await.map_err(Into::into) })
    }

    fn find_room_by_invite_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room_by_invite_code(code).await.map_err(Into::into) })
    }

    fn save_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_room(room, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<MembershipEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_membership(room_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn save_membership(&self, membership: MembershipEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_membership(membership).await.map_err(Into::into) })
    }

    fn list_memberships(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MembershipEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_memberships(room_id).await.map_err(Into::into) })
    }

    fn count_other_participants(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_other_participants(room_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn update_conviction_scores(
        &self,
        room_id: RoomId,
        scores: Vec<(UserId, u8)>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_conviction_scores(room_id, scores)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_message(&self, message: NewMessage) -> BoxFuture<'static, StorageResult<MessageEntity>> {
        let store = self.clone();
        Box::pin(async move { store.insert_message(message).await.map_err(Into::into) })
    }

    fn messages_after(
        &self,
        room_id: RoomId,
        after: MessageId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.messages_after(room_id, after).await.map_err(Into::into) })
    }

    fn judgment_exists(&self, room_id: RoomId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.judgment_exists(room_id).await.map_err(Into::into) })
    }

    fn insert_judgment(
        &self,
        judgment: NewJudgment,
    ) -> BoxFuture<'static, StorageResult<JudgmentEntity>> {
        let store = self.clone();
        Box::pin(async move { store.insert_judgment(judgment).await.map_err(Into::into) })
    }

    fn find_judgment(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<JudgmentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_judgment(room_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.health_check().await.map_err(Into::into) })
    }
}
