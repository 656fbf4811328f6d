//! Fixtures shared by the service tests.

use std::{
    future, io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    cache::{CacheStore, MemoryCache, RoomCache},
    config::AppConfig,
    dao::{
        debate_store::{DebateStore, MemoryDebateStore},
        models::{
            JudgmentEntity, MembershipEntity, MessageEntity, MessageId, NewJudgment, NewMessage,
            NewRoom, RoomEntity, RoomId, UserId, UserRef,
        },
        storage::{StorageError, StorageResult},
    },
    services::{
        judge::{DebateTranscript, Judge, JudgeError, Side, Verdict},
        judgment_pool::{JobHandler, JudgmentJob, JudgmentPool},
        judgment_service::JudgmentRunner,
        room_service,
    },
    state::{
        AppState, SharedState,
        room_machine::{self, RoomEvent},
    },
};

pub(crate) fn alice() -> UserRef {
    UserRef::new(1, "alice")
}

pub(crate) fn bob() -> UserRef {
    UserRef::new(2, "bob")
}

pub(crate) fn carol() -> UserRef {
    UserRef::new(3, "carol")
}

pub(crate) fn dave() -> UserRef {
    UserRef::new(4, "dave")
}

/// Judge with a fixed answer that can be switched to fail or to never answer.
pub(crate) struct ScriptedJudge {
    winner: Side,
    score: u8,
    failing: AtomicBool,
    hanging: AtomicBool,
    verdict_calls: AtomicUsize,
    score_calls: AtomicUsize,
}

impl ScriptedJudge {
    pub(crate) fn new(winner: Side, score: u8) -> Arc<Self> {
        Arc::new(Self {
            winner,
            score,
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            verdict_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub(crate) fn verdict_calls(&self) -> usize {
        self.verdict_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    fn answer<T: Send + 'static>(&self, value: T) -> BoxFuture<'static, Result<T, JudgeError>> {
        if self.hanging.load(Ordering::SeqCst) {
            return Box::pin(future::pending());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(JudgeError::EmptyReply)));
        }
        Box::pin(future::ready(Ok(value)))
    }
}

impl Judge for ScriptedJudge {
    fn verdict(&self, _transcript: DebateTranscript) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
        self.verdict_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(Verdict {
            winner: self.winner,
            winner_logic_score: 80,
            winner_empathy_score: 65,
            comment: "well argued".into(),
            winner_reason: "stayed on topic".into(),
            loser_reason: "changed the subject".into(),
        })
    }

    fn score(&self, _transcript: DebateTranscript) -> BoxFuture<'static, Result<u8, JudgeError>> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.score)
    }
}

/// Memory store that can fail membership listings or slip an exit request in between
/// the reads of a poll.
pub(crate) struct ScriptedStore {
    inner: Arc<MemoryDebateStore>,
    failing_memberships: AtomicBool,
    exit_during_read: Mutex<Option<UserRef>>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryDebateStore::new()),
            failing_memberships: AtomicBool::new(false),
            exit_during_read: Mutex::new(None),
        })
    }

    pub(crate) fn set_failing_memberships(&self, failing: bool) {
        self.failing_memberships.store(failing, Ordering::SeqCst);
    }

    /// The next `messages_after` call first records an exit request by `requester`.
    pub(crate) fn request_exit_during_next_read(&self, requester: UserRef) {
        *self.exit_during_read.lock().unwrap() = Some(requester);
    }
}

impl DebateStore for ScriptedStore {
    fn create_room(&self, room: NewRoom) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        self.inner.create_room(room)
    }

    fn find_room(&self, id: RoomId) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        self.inner.find_room(id)
    }

    fn find_room_by_invite_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        self.inner.find_room_by_invite_code(code)
    }

    fn save_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        self.inner.save_room(room, expected_version)
    }

    fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<MembershipEntity>>> {
        self.inner.find_membership(room_id, user_id)
    }

    fn save_membership(&self, membership: MembershipEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_membership(membership)
    }

    fn list_memberships(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Vec<MembershipEntity>>> {
        if self.failing_memberships.load(Ordering::SeqCst) {
            let err = StorageError::unavailable(
                "membership listing failed".into(),
                io::Error::other("connection reset"),
            );
            return Box::pin(future::ready(Err(err)));
        }
        self.inner.list_memberships(room_id)
    }

    fn count_other_participants(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.count_other_participants(room_id, user_id)
    }

    fn update_conviction_scores(
        &self,
        room_id: RoomId,
        scores: Vec<(UserId, u8)>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.update_conviction_scores(room_id, scores)
    }

    fn insert_message(&self, message: NewMessage) -> BoxFuture<'static, StorageResult<MessageEntity>> {
        self.inner.insert_message(message)
    }

    fn messages_after(
        &self,
        room_id: RoomId,
        after: MessageId,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let inner = self.inner.clone();
        let requester = self.exit_during_read.lock().unwrap().take();
        Box::pin(async move {
            if let Some(requester) = requester {
                let mut room = inner.find_room(room_id).await?.expect("room exists");
                let expected = room.version;
                room_machine::apply(&mut room, RoomEvent::RequestExit { requester })
                    .expect("room accepts an exit request");
                inner.save_room(room, expected).await?;
            }
            inner.messages_after(room_id, after).await
        })
    }

    fn judgment_exists(&self, room_id: RoomId) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.judgment_exists(room_id)
    }

    fn insert_judgment(
        &self,
        judgment: NewJudgment,
    ) -> BoxFuture<'static, StorageResult<JudgmentEntity>> {
        self.inner.insert_judgment(judgment)
    }

    fn find_judgment(
        &self,
        room_id: RoomId,
    ) -> BoxFuture<'static, StorageResult<Option<JudgmentEntity>>> {
        self.inner.find_judgment(room_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}

/// Records submitted jobs instead of running them, so tests drive the runner themselves.
struct RecordingHandler {
    jobs: UnboundedSender<JudgmentJob>,
}

impl JobHandler for RecordingHandler {
    fn handle(&self, job: JudgmentJob) -> BoxFuture<'static, ()> {
        let _ = self.jobs.send(job);
        Box::pin(future::ready(()))
    }
}

/// Application state over the in-memory store plus handles to inspect it.
pub(crate) struct Harness {
    pub state: SharedState,
    pub store: Arc<dyn DebateStore>,
    pub cache: RoomCache,
    pub runner: JudgmentRunner,
    pub judge: Arc<ScriptedJudge>,
    pub jobs: UnboundedReceiver<JudgmentJob>,
}

impl Harness {
    /// Memory store and memory cache; jobs are recorded, not run.
    pub(crate) fn new() -> Self {
        Self::build(
            Arc::new(MemoryDebateStore::new()),
            Arc::new(MemoryCache::new()),
            AppConfig::default(),
        )
    }

    /// Same store as `self` behind a different cache backend.
    pub(crate) fn sharing_store(&self, cache: Arc<dyn CacheStore>) -> Self {
        Self::build(self.store.clone(), cache, self.state.config().clone())
    }

    pub(crate) fn with_cache(cache: Arc<dyn CacheStore>) -> Self {
        Self::build(
            Arc::new(MemoryDebateStore::new()),
            cache,
            AppConfig::default(),
        )
    }

    pub(crate) fn with_store(store: Arc<dyn DebateStore>) -> Self {
        Self::build(store, Arc::new(MemoryCache::new()), AppConfig::default())
    }

    pub(crate) fn with_config(config: AppConfig) -> Self {
        Self::build(
            Arc::new(MemoryDebateStore::new()),
            Arc::new(MemoryCache::new()),
            config,
        )
    }

    fn build(store: Arc<dyn DebateStore>, cache: Arc<dyn CacheStore>, config: AppConfig) -> Self {
        let cache = RoomCache::new(cache, config.cache.ttl);
        let judge = ScriptedJudge::new(Side::Defendant, 70);
        let runner = JudgmentRunner::new(
            store.clone(),
            cache.clone(),
            judge.clone(),
            Duration::from_millis(200),
        );

        let (sender, jobs) = mpsc::unbounded_channel();
        let pool = JudgmentPool::spawn(1, 16, Arc::new(RecordingHandler { jobs: sender }));
        let state = AppState::new(store.clone(), cache.clone(), pool, config);

        Self {
            state,
            store,
            cache,
            runner,
            judge,
            jobs,
        }
    }

    /// Runner over the same store and cache with a custom judge deadline.
    pub(crate) fn runner_with_timeout(&self, timeout: Duration) -> JudgmentRunner {
        JudgmentRunner::new(
            self.store.clone(),
            self.cache.clone(),
            self.judge.clone(),
            timeout,
        )
    }

    /// Room created by alice, joined by bob as participant and carol as observer.
    pub(crate) async fn debate(&self) -> RoomId {
        let room = room_service::create_room(&self.state, alice(), Some("Cats vs dogs".into()))
            .await
            .unwrap();
        room_service::join_room(&self.state, &room.participant_code, bob())
            .await
            .unwrap();
        room_service::join_room(&self.state, &room.observer_code, carol())
            .await
            .unwrap();
        room.room_id
    }

    /// Debate whose exit bob requested and alice accepted.
    pub(crate) async fn accepted_debate(&self) -> RoomId {
        let room_id = self.debate().await;
        room_service::request_exit(&self.state, room_id, bob())
            .await
            .unwrap();
        room_service::decide_exit(&self.state, room_id, alice(), true)
            .await
            .unwrap();
        room_id
    }

    /// Wait for the next job recorded by the pool.
    pub(crate) async fn next_job(&mut self) -> JudgmentJob {
        tokio::time::timeout(Duration::from_secs(5), self.jobs.recv())
            .await
            .expect("no job submitted")
            .expect("pool dropped")
    }

    /// Every job recorded so far, without waiting for more.
    pub(crate) async fn drain_jobs(&mut self) -> Vec<JudgmentJob> {
        // Give the worker a chance to pick up anything already queued.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}
