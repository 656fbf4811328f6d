//! Background adjudication of debates and verdict lookup.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    cache::{RoomCache, ScoreMap, StatusSnapshot},
    dao::{
        debate_store::DebateStore,
        models::{JudgmentEntity, NewJudgment, RoomEntity, RoomId, RoomStatus, UserRef},
        storage::StorageError,
    },
    dto::judgment::JudgmentResponse,
    error::ServiceError,
    services::{
        judge::{DebateTranscript, Judge, JudgeError, Side, TranscriptLine},
        judgment_pool::{JobHandler, JobKind, JudgmentJob},
        membership::{Debaters, debaters, require_member},
    },
    state::{
        SharedState,
        room_machine::{self, InvalidTransition, RoomEvent},
    },
};

/// Failures inside a judgment job. They never leave the worker.
#[derive(Debug, Error)]
pub enum JudgmentError {
    /// The durable store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The room does not exist.
    #[error("room {0} does not exist")]
    RoomNotFound(RoomId),
    /// The room is not in `EXIT_ACCEPTED`.
    #[error("room {room_id} is {status}; a verdict needs EXIT_ACCEPTED")]
    NotAwaitingJudgment {
        /// Room asked for.
        room_id: RoomId,
        /// Status it was found in.
        status: RoomStatus,
    },
    /// The room lacks a second participant.
    #[error("room {0} does not have two participants")]
    InsufficientParticipants(RoomId),
    /// The judge answered with an error.
    #[error("judge call failed: {0}")]
    Judge(#[from] JudgeError),
    /// The judge did not answer in time.
    #[error("judge did not answer within {0:?}")]
    Timeout(Duration),
    /// Closing the room was rejected.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// What a verdict run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    /// This run stored the verdict.
    Written(JudgmentEntity),
    /// A verdict already existed; at most the room status was repaired.
    AlreadyJudged,
}

/// What an interim scoring run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescoreOutcome {
    /// Scores stored, keyed by nickname.
    Rescored(ScoreMap),
    /// The room is closed or still waiting for its second participant.
    Skipped,
}

/// Runs judgment jobs against the store, the cache and the judge.
#[derive(Clone)]
pub struct JudgmentRunner {
    store: Arc<dyn DebateStore>,
    cache: RoomCache,
    judge: Arc<dyn Judge>,
    timeout: Duration,
}

impl JudgmentRunner {
    /// Runner bounding every judge call by `timeout`.
    pub fn new(
        store: Arc<dyn DebateStore>,
        cache: RoomCache,
        judge: Arc<dyn Judge>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            judge,
            timeout,
        }
    }

    /// Produce the final verdict of a room awaiting judgment and close it.
    ///
    /// Safe to call any number of times: once a verdict exists the run only makes sure the
    /// room is closed.
    pub async fn run_verdict(&self, room_id: RoomId) -> Result<VerdictOutcome, JudgmentError> {
        if self.store.judgment_exists(room_id).await? {
            self.close_judged_room(room_id).await?;
            return Ok(VerdictOutcome::AlreadyJudged);
        }

        let room = self.load_room(room_id).await?;
        if room.status != RoomStatus::ExitAccepted {
            return Err(JudgmentError::NotAwaitingJudgment {
                room_id,
                status: room.status,
            });
        }

        let debaters = self.debaters(&room).await?;
        let transcript = self.transcript(room_id, &debaters).await?;
        let verdict = self.call_judge(self.judge.verdict(transcript)).await?;

        let (winner, loser) = match verdict.winner {
            Side::Plaintiff => (&debaters.plaintiff, &debaters.defendant),
            Side::Defendant => (&debaters.defendant, &debaters.plaintiff),
        };
        let judgment = NewJudgment {
            room_id,
            winner: winner.nickname.clone(),
            plaintiff: debaters.plaintiff.nickname.clone(),
            defendant: debaters.defendant.nickname.clone(),
            winner_logic_score: verdict.winner_logic_score,
            winner_empathy_score: verdict.winner_empathy_score,
            comment: verdict.comment,
            winner_reason: verdict.winner_reason,
            loser_reason: verdict.loser_reason,
        };

        let judgment = match self.store.insert_judgment(judgment).await {
            Ok(judgment) => judgment,
            Err(StorageError::Duplicate { .. }) => {
                // Another run won the race between the existence check and the insert.
                self.close_judged_room(room_id).await?;
                return Ok(VerdictOutcome::AlreadyJudged);
            }
            Err(err) => return Err(err.into()),
        };

        self.close(room).await?;
        info!(
            room_id,
            winner = %judgment.winner,
            loser = %loser.nickname,
            "judgment written; room closed"
        );
        Ok(VerdictOutcome::Written(judgment))
    }

    /// Ask the judge for interim conviction scores and store them on both participants.
    pub async fn run_rescore(&self, room_id: RoomId) -> Result<RescoreOutcome, JudgmentError> {
        let room = self.load_room(room_id).await?;
        if room.status == RoomStatus::Closed {
            return Ok(RescoreOutcome::Skipped);
        }

        let memberships = self.store.list_memberships(room_id).await?;
        let Some(debaters) = debaters(&room, &memberships) else {
            return Ok(RescoreOutcome::Skipped);
        };

        let transcript = self.transcript(room_id, &debaters).await?;
        let plaintiff_share = self.call_judge(self.judge.score(transcript)).await?.min(100);
        let defendant_share = 100 - plaintiff_share;

        self.store
            .update_conviction_scores(
                room_id,
                vec![
                    (debaters.plaintiff.id, plaintiff_share),
                    (debaters.defendant.id, defendant_share),
                ],
            )
            .await?;

        let scores = ScoreMap::from([
            (debaters.plaintiff.nickname, plaintiff_share),
            (debaters.defendant.nickname, defendant_share),
        ]);
        self.cache.set_percent(room_id, &scores).await;
        Ok(RescoreOutcome::Rescored(scores))
    }

    async fn load_room(&self, room_id: RoomId) -> Result<RoomEntity, JudgmentError> {
        self.store
            .find_room(room_id)
            .await?
            .ok_or(JudgmentError::RoomNotFound(room_id))
    }

    async fn debaters(&self, room: &RoomEntity) -> Result<Debaters, JudgmentError> {
        let memberships = self.store.list_memberships(room.id).await?;
        debaters(room, &memberships).ok_or(JudgmentError::InsufficientParticipants(room.id))
    }

    async fn transcript(
        &self,
        room_id: RoomId,
        debaters: &Debaters,
    ) -> Result<DebateTranscript, JudgmentError> {
        let messages = self.store.messages_after(room_id, 0).await?;
        let lines = messages
            .into_iter()
            .map(|message| TranscriptLine {
                side: side_of(&message.sender, debaters),
                content: message.content,
            })
            .collect();

        Ok(DebateTranscript {
            plaintiff: debaters.plaintiff.nickname.clone(),
            defendant: debaters.defendant.nickname.clone(),
            lines,
        })
    }

    async fn call_judge<T>(
        &self,
        call: BoxFuture<'static, Result<T, JudgeError>>,
    ) -> Result<T, JudgmentError> {
        match timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(JudgmentError::Timeout(self.timeout)),
        }
    }

    /// Finish a room whose verdict is already stored but which is still awaiting judgment.
    async fn close_judged_room(&self, room_id: RoomId) -> Result<(), JudgmentError> {
        let room = self.load_room(room_id).await?;
        if room.status == RoomStatus::ExitAccepted {
            warn!(room_id, "verdict exists but room was not closed; closing it");
            self.close(room).await?;
        }
        Ok(())
    }

    async fn close(&self, mut room: RoomEntity) -> Result<(), JudgmentError> {
        let room_id = room.id;
        let expected_version = room.version;
        room_machine::apply(&mut room, RoomEvent::CompleteJudgment)?;
        match self.store.save_room(room, expected_version).await {
            Ok(_) => {}
            Err(StorageError::VersionConflict { .. }) => {
                // A concurrent run of the same room may have closed it first.
                let current = self.load_room(room_id).await?;
                if current.status != RoomStatus::Closed {
                    return Err(StorageError::VersionConflict {
                        room_id,
                        expected: expected_version,
                    }
                    .into());
                }
                debug!(room_id, "room already closed by a concurrent run");
            }
            Err(err) => return Err(err.into()),
        }

        self.cache
            .set_status(room_id, &StatusSnapshot::new(RoomStatus::Closed, None))
            .await;
        Ok(())
    }
}

fn side_of(sender: &UserRef, debaters: &Debaters) -> Side {
    if sender.id == debaters.plaintiff.id {
        Side::Plaintiff
    } else {
        Side::Defendant
    }
}

impl JobHandler for JudgmentRunner {
    fn handle(&self, job: JudgmentJob) -> BoxFuture<'static, ()> {
        let runner = self.clone();
        Box::pin(async move {
            match job.kind {
                JobKind::Verdict => match runner.run_verdict(job.room_id).await {
                    Ok(VerdictOutcome::AlreadyJudged) => {
                        info!(job_id = %job.id, room_id = job.room_id, "room already judged; skipping");
                    }
                    Ok(VerdictOutcome::Written(_)) => {}
                    Err(err) => {
                        error!(job_id = %job.id, room_id = job.room_id, error = %err, "judgment failed; room stays pending");
                    }
                },
                JobKind::Rescore => {
                    if let Err(err) = runner.run_rescore(job.room_id).await {
                        error!(job_id = %job.id, room_id = job.room_id, error = %err, "interim scoring failed");
                    }
                }
            }
        })
    }
}

/// Return the verdict of a room to one of its members.
pub async fn get_judgment(
    state: &SharedState,
    room_id: RoomId,
    user: &UserRef,
) -> Result<JudgmentResponse, ServiceError> {
    let store = state.store();
    require_member(store, room_id, user.id).await?;

    let judgment = store
        .find_judgment(room_id)
        .await?
        .ok_or(ServiceError::JudgmentNotFound(room_id))?;
    Ok(judgment.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cache::{MemoryCache, testing::FailingCache},
        config::AppConfig,
        services::{
            judgment_pool::JudgmentPool,
            message_service::send_message,
            poll_service::poll,
            room_service::{decide_exit, request_exit},
            test_support::{Harness, ScriptedJudge, alice, bob, carol, dave},
        },
        state::AppState,
    };

    async fn status(h: &Harness, room_id: RoomId) -> RoomStatus {
        h.store.find_room(room_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn verdict_is_written_and_room_closed() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        send_message(&h.state, room_id, alice(), "cats are independent").await.unwrap();

        let VerdictOutcome::Written(judgment) = h.runner.run_verdict(room_id).await.unwrap() else {
            panic!("expected a fresh verdict");
        };
        assert_eq!(judgment.winner, "bob");
        assert_eq!(judgment.plaintiff, "alice");
        assert_eq!(judgment.defendant, "bob");

        assert_eq!(status(&h, room_id).await, RoomStatus::Closed);
        assert_eq!(
            h.cache.status(room_id).await,
            Some(StatusSnapshot::new(RoomStatus::Closed, None))
        );

        let fetched = get_judgment(&h.state, room_id, &carol()).await.unwrap();
        assert_eq!(fetched.winner, "bob");
        assert_eq!(fetched.winner_logic_score, 80);
    }

    #[tokio::test]
    async fn repeated_runs_judge_once() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;

        assert!(matches!(
            h.runner.run_verdict(room_id).await.unwrap(),
            VerdictOutcome::Written(_)
        ));
        for _ in 0..3 {
            assert_eq!(
                h.runner.run_verdict(room_id).await.unwrap(),
                VerdictOutcome::AlreadyJudged
            );
        }
        assert_eq!(h.judge.verdict_calls(), 1);
        assert_eq!(status(&h, room_id).await, RoomStatus::Closed);
    }

    #[tokio::test]
    async fn concurrent_runs_store_a_single_verdict() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        let other = h.runner.clone();

        let (first, second) = tokio::join!(h.runner.run_verdict(room_id), other.run_verdict(room_id));
        let outcomes = [first.unwrap(), second.unwrap()];
        let written = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, VerdictOutcome::Written(_)))
            .count();
        assert_eq!(written, 1);
        assert_eq!(status(&h, room_id).await, RoomStatus::Closed);
        assert!(h.store.find_judgment(room_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn verdict_requires_an_accepted_exit() {
        let h = Harness::new();
        let room_id = h.debate().await;

        assert!(matches!(
            h.runner.run_verdict(room_id).await,
            Err(JudgmentError::NotAwaitingJudgment {
                status: RoomStatus::Alive,
                ..
            })
        ));
        assert!(matches!(
            h.runner.run_verdict(room_id + 100).await,
            Err(JudgmentError::RoomNotFound(_))
        ));
        assert_eq!(h.judge.verdict_calls(), 0);
        assert!(!h.store.judgment_exists(room_id).await.unwrap());
    }

    #[tokio::test]
    async fn judge_failure_leaves_room_pending_until_retried() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;

        h.judge.set_failing(true);
        assert!(matches!(
            h.runner.run_verdict(room_id).await,
            Err(JudgmentError::Judge(_))
        ));
        assert_eq!(status(&h, room_id).await, RoomStatus::ExitAccepted);
        assert!(matches!(
            get_judgment(&h.state, room_id, &alice()).await,
            Err(ServiceError::JudgmentNotFound(_))
        ));

        h.judge.set_failing(false);
        assert!(matches!(
            h.runner.run_verdict(room_id).await.unwrap(),
            VerdictOutcome::Written(_)
        ));
        assert_eq!(status(&h, room_id).await, RoomStatus::Closed);
    }

    #[tokio::test]
    async fn slow_judge_times_out() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        h.judge.set_hanging(true);

        let runner = h.runner_with_timeout(Duration::from_millis(20));
        assert!(matches!(
            runner.run_verdict(room_id).await,
            Err(JudgmentError::Timeout(_))
        ));
        assert_eq!(status(&h, room_id).await, RoomStatus::ExitAccepted);
    }

    #[tokio::test]
    async fn stored_verdict_repairs_unclosed_room() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        h.store
            .insert_judgment(NewJudgment {
                room_id,
                winner: "alice".into(),
                plaintiff: "alice".into(),
                defendant: "bob".into(),
                winner_logic_score: 60,
                winner_empathy_score: 60,
                comment: String::new(),
                winner_reason: String::new(),
                loser_reason: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(
            h.runner.run_verdict(room_id).await.unwrap(),
            VerdictOutcome::AlreadyJudged
        );
        assert_eq!(status(&h, room_id).await, RoomStatus::Closed);
        assert_eq!(h.judge.verdict_calls(), 0);
    }

    #[tokio::test]
    async fn handler_contains_failures() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        h.judge.set_failing(true);

        h.runner.handle(JudgmentJob::verdict(room_id)).await;
        h.runner.handle(JudgmentJob::rescore(room_id)).await;
        assert_eq!(status(&h, room_id).await, RoomStatus::ExitAccepted);
    }

    #[tokio::test]
    async fn cache_outage_does_not_block_the_verdict() {
        let h = Harness::with_cache(Arc::new(FailingCache));
        let room_id = h.accepted_debate().await;

        assert!(matches!(
            h.runner.run_verdict(room_id).await.unwrap(),
            VerdictOutcome::Written(_)
        ));
        let polled = poll(&h.state, room_id, None, &bob()).await.unwrap();
        assert_eq!(polled.status, RoomStatus::Closed);
    }

    #[tokio::test]
    async fn rescore_splits_conviction_between_debaters() {
        let h = Harness::new();
        let room_id = h.debate().await;

        let outcome = h.runner.run_rescore(room_id).await.unwrap();
        let expected = ScoreMap::from([("alice".into(), 70), ("bob".into(), 30)]);
        assert_eq!(outcome, RescoreOutcome::Rescored(expected.clone()));
        assert_eq!(h.cache.percent(room_id).await, Some(expected.clone()));

        let bob_membership = h.store.find_membership(room_id, bob().id).await.unwrap().unwrap();
        assert_eq!(bob_membership.conviction_score, 30);

        let polled = poll(&h.state, room_id, None, &carol()).await.unwrap();
        assert_eq!(polled.percent, expected);
    }

    #[tokio::test]
    async fn rescore_skips_lone_participant_and_closed_rooms() {
        let h = Harness::new();
        let room = crate::services::room_service::create_room(&h.state, dave(), None)
            .await
            .unwrap();
        assert_eq!(
            h.runner.run_rescore(room.room_id).await.unwrap(),
            RescoreOutcome::Skipped
        );

        let room_id = h.accepted_debate().await;
        h.runner.run_verdict(room_id).await.unwrap();
        assert_eq!(
            h.runner.run_rescore(room_id).await.unwrap(),
            RescoreOutcome::Skipped
        );
        assert_eq!(h.judge.score_calls(), 0);
    }

    #[tokio::test]
    async fn judgment_is_visible_to_members_only() {
        let h = Harness::new();
        let room_id = h.accepted_debate().await;
        h.runner.run_verdict(room_id).await.unwrap();

        assert!(matches!(
            get_judgment(&h.state, room_id, &dave()).await,
            Err(ServiceError::NotMember(_))
        ));
    }

    #[tokio::test]
    async fn accepted_exit_is_judged_in_the_background() {
        let store: Arc<dyn DebateStore> = Arc::new(crate::dao::debate_store::MemoryDebateStore::new());
        let config = AppConfig::default();
        let cache = RoomCache::new(Arc::new(MemoryCache::new()), config.cache.ttl);
        let judge = ScriptedJudge::new(Side::Plaintiff, 50);
        let runner = JudgmentRunner::new(store.clone(), cache.clone(), judge, Duration::from_secs(1));
        let pool = JudgmentPool::spawn(2, 8, Arc::new(runner));
        let state = AppState::new(store, cache, pool, config);

        let room = crate::services::room_service::create_room(&state, alice(), None)
            .await
            .unwrap();
        crate::services::room_service::join_room(&state, &room.participant_code, bob())
            .await
            .unwrap();
        send_message(&state, room.room_id, bob(), "dogs are loyal").await.unwrap();
        request_exit(&state, room.room_id, alice()).await.unwrap();
        decide_exit(&state, room.room_id, bob(), true).await.unwrap();

        let judgment = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(judgment) = get_judgment(&state, room.room_id, &alice()).await {
                    break judgment;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("judgment was not produced");
        assert_eq!(judgment.winner, "alice");

        state.judgments().shutdown().await;
        let polled = poll(&state, room.room_id, None, &bob()).await.unwrap();
        assert_eq!(polled.status, RoomStatus::Closed);
    }
}
