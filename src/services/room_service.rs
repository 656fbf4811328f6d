//! Room lifecycle: creation, joining, and the exit request/decision flow.

use rand::Rng;
use time::{OffsetDateTime, macros::format_description};
use tracing::{info, warn};

use crate::{
    cache::StatusSnapshot,
    dao::{
        models::{MemberRole, MembershipEntity, NewRoom, RoomEntity, RoomId, RoomStatus, UserRef},
        storage::StorageError,
    },
    dto::room::{
        CreateRoomResponse, ExitDecisionResponse, ExitRequestResponse, JoinRoomResponse,
        RetryJudgmentResponse,
    },
    error::ServiceError,
    services::{
        judgment_pool::JudgmentJob,
        membership::{require_member, require_participant, require_room, score_map},
    },
    state::{
        SharedState,
        room_machine::{self, RoomEvent},
    },
};

/// A room holds at most this many participants.
const MAX_PARTICIPANTS: u64 = 2;
/// Attempts at drawing unused invite codes before giving up.
const INVITE_CODE_ATTEMPTS: usize = 5;

/// Open a room owned by `creator`, who joins it as the first participant.
pub async fn create_room(
    state: &SharedState,
    creator: UserRef,
    title: Option<String>,
) -> Result<CreateRoomResponse, ServiceError> {
    let store = state.store();
    let title = title
        .map(|title| title.trim().to_owned())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(default_title);

    let mut attempt = 0;
    let room = loop {
        attempt += 1;
        let (participant_code, observer_code) = invite_codes();
        let new_room = NewRoom {
            title: title.clone(),
            participant_code,
            observer_code,
            creator: creator.clone(),
        };

        match store.create_room(new_room).await {
            Ok(room) => break room,
            Err(StorageError::Duplicate { .. }) if attempt < INVITE_CODE_ATTEMPTS => {
                warn!(attempt, "invite code collision; drawing new codes");
            }
            Err(err) => return Err(err.into()),
        }
    };

    let creator_membership = MembershipEntity::new(room.id, creator, MemberRole::Participant);
    let scores = score_map(std::slice::from_ref(&creator_membership));
    store.save_membership(creator_membership).await?;

    let cache = state.cache();
    cache
        .set_status(room.id, &StatusSnapshot::new(RoomStatus::Alive, None))
        .await;
    cache.set_percent(room.id, &scores).await;
    cache.set_last_message_id(room.id, 0).await;

    info!(room_id = room.id, creator = %room.creator.nickname, "room created");
    Ok(room.into())
}

/// Enter the room matching `invite_code` with the role that code grants.
pub async fn join_room(
    state: &SharedState,
    invite_code: &str,
    user: UserRef,
) -> Result<JoinRoomResponse, ServiceError> {
    let store = state.store();
    let invite_code = invite_code.trim();
    let room = store
        .find_room_by_invite_code(invite_code.to_owned())
        .await?
        .ok_or(ServiceError::InvalidInviteCode)?;
    let role = role_for_code(&room, invite_code).ok_or(ServiceError::InvalidInviteCode)?;

    if store.find_membership(room.id, user.id).await?.is_some() {
        return Err(ServiceError::AlreadyJoined(room.id));
    }

    if role == MemberRole::Participant {
        if store.count_other_participants(room.id, user.id).await? >= MAX_PARTICIPANTS {
            return Err(ServiceError::RoomFull(room.id));
        }
        // Bumping the version makes concurrent participant joins conflict instead of
        // overfilling the room.
        store.save_room(room.clone(), room.version).await?;
    }

    let membership = MembershipEntity::new(room.id, user.clone(), role);
    match store.save_membership(membership).await {
        Ok(()) => {}
        Err(StorageError::Duplicate { .. }) => return Err(ServiceError::AlreadyJoined(room.id)),
        Err(err) => return Err(err.into()),
    }

    if role == MemberRole::Participant {
        match store.list_memberships(room.id).await {
            Ok(memberships) => {
                state
                    .cache()
                    .set_percent(room.id, &score_map(&memberships))
                    .await;
            }
            Err(err) => {
                // The join is committed; the next poll rebuilds the scores from the store.
                warn!(room_id = room.id, error = %err, "failed to refresh cached scores after join");
                state.cache().invalidate(room.id).await;
            }
        }
    }

    info!(room_id = room.id, user = %user.nickname, %role, "user joined room");
    Ok(JoinRoomResponse {
        room_id: room.id,
        title: room.title,
        role,
    })
}

/// Ask to end the debate; the other participant must decide.
pub async fn request_exit(
    state: &SharedState,
    room_id: RoomId,
    requester: UserRef,
) -> Result<ExitRequestResponse, ServiceError> {
    let store = state.store();
    let mut room = require_room(store, room_id).await?;
    if room.status == RoomStatus::Closed {
        return Err(ServiceError::RoomClosed(room_id));
    }

    let membership = require_member(store, room_id, requester.id).await?;
    require_participant(&membership)?;

    let expected_version = room.version;
    room_machine::apply(
        &mut room,
        RoomEvent::RequestExit {
            requester: membership.user.clone(),
        },
    )
    .map_err(|err| ServiceError::from_transition(room_id, err))?;
    let room = store.save_room(room, expected_version).await?;

    let requester_nickname = membership.user.nickname;
    state
        .cache()
        .set_status(
            room_id,
            &StatusSnapshot::new(room.status, Some(requester_nickname.clone())),
        )
        .await;

    info!(room_id, requester = %requester_nickname, "exit requested");
    Ok(ExitRequestResponse {
        room_id,
        status: room.status,
        requester_nickname,
    })
}

/// Accept or reject the pending exit request. Acceptance queues the verdict.
pub async fn decide_exit(
    state: &SharedState,
    room_id: RoomId,
    decider: UserRef,
    approve: bool,
) -> Result<ExitDecisionResponse, ServiceError> {
    let store = state.store();
    let mut room = require_room(store, room_id).await?;
    if room.status != RoomStatus::ExitRequested {
        return Err(ServiceError::NoExitRequest(room_id));
    }

    let membership = require_member(store, room_id, decider.id).await?;
    require_participant(&membership)?;
    if room
        .exit_requester
        .as_ref()
        .is_some_and(|requester| requester.id == decider.id)
    {
        return Err(ServiceError::PermissionDenied(
            "the requester cannot decide their own exit request".into(),
        ));
    }

    let event = if approve {
        RoomEvent::AcceptExit
    } else {
        RoomEvent::RejectExit
    };
    let expected_version = room.version;
    room_machine::apply(&mut room, event)
        .map_err(|err| ServiceError::from_transition(room_id, err))?;
    let room = store.save_room(room, expected_version).await?;

    state
        .cache()
        .set_status(room_id, &StatusSnapshot::new(room.status, None))
        .await;

    if approve {
        let outcome = state.judgments().submit(JudgmentJob::verdict(room_id));
        info!(room_id, ?outcome, "exit accepted; judgment submitted");
    } else {
        info!(room_id, "exit rejected; debate resumes");
    }

    Ok(ExitDecisionResponse {
        room_id,
        approved: approve,
        status: room.status,
    })
}

/// Queue the verdict again for a room stuck awaiting its judgment.
pub async fn retry_judgment(
    state: &SharedState,
    room_id: RoomId,
    user: UserRef,
) -> Result<RetryJudgmentResponse, ServiceError> {
    let store = state.store();
    let room = require_room(store, room_id).await?;
    let membership = require_member(store, room_id, user.id).await?;
    require_participant(&membership)?;

    if room.status != RoomStatus::ExitAccepted {
        return Err(ServiceError::InvalidState(format!(
            "room {room_id} is {}; only rooms awaiting judgment can be retried",
            room.status
        )));
    }

    let outcome = state.judgments().submit(JudgmentJob::verdict(room_id));
    info!(room_id, user = %user.nickname, ?outcome, "judgment retry requested");
    Ok(RetryJudgmentResponse {
        room_id,
        queued: outcome.is_queued(),
    })
}

fn role_for_code(room: &RoomEntity, code: &str) -> Option<MemberRole> {
    if code == room.participant_code {
        Some(MemberRole::Participant)
    } else if code == room.observer_code {
        Some(MemberRole::Observer)
    } else {
        None
    }
}

/// Two distinct `NNNN-NNNN` codes: participant first, observer second.
fn invite_codes() -> (String, String) {
    let mut rng = rand::rng();
    let mut draw = || {
        format!(
            "{:04}-{:04}",
            rng.random_range(0..10_000),
            rng.random_range(0..10_000)
        )
    };

    let participant = draw();
    let mut observer = draw();
    while observer == participant {
        observer = draw();
    }
    (participant, observer)
}

fn default_title() -> String {
    let date = OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();
    let suffix = rand::rng().random_range(0..100);
    format!("Debate {date} #{suffix:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ScoreMap,
        services::{
            judgment_pool::JobKind,
            poll_service::poll,
            test_support::{Harness, ScriptedStore, alice, bob, carol, dave},
        },
    };

    #[test]
    fn invite_codes_are_distinct_and_well_formed() {
        for _ in 0..100 {
            let (participant, observer) = invite_codes();
            assert_ne!(participant, observer);
            for code in [participant, observer] {
                assert_eq!(code.len(), 9);
                assert_eq!(&code[4..5], "-");
                assert!(code.chars().filter(|c| *c != '-').all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn default_title_carries_date_and_suffix() {
        let title = default_title();
        assert!(title.starts_with("Debate "));
        let (_, suffix) = title.rsplit_once(" #").unwrap();
        assert_eq!(suffix.len(), 2);
    }

    #[tokio::test]
    async fn create_room_enrolls_creator_and_primes_cache() {
        let h = Harness::new();
        let room = create_room(&h.state, alice(), None).await.unwrap();
        assert!(room.title.starts_with("Debate "));

        let membership = h.store.find_membership(room.room_id, 1).await.unwrap().unwrap();
        assert_eq!(membership.role, MemberRole::Participant);
        assert_eq!(membership.conviction_score, 50);

        assert_eq!(
            h.cache.status(room.room_id).await,
            Some(StatusSnapshot::new(RoomStatus::Alive, None))
        );
        assert_eq!(
            h.cache.percent(room.room_id).await,
            Some(ScoreMap::from([("alice".into(), 50)]))
        );
        assert_eq!(h.cache.last_message_id(room.room_id).await, Some(0));
    }

    #[tokio::test]
    async fn join_grants_the_role_of_the_code() {
        let h = Harness::new();
        let room = create_room(&h.state, alice(), None).await.unwrap();

        let joined = join_room(&h.state, &room.participant_code, bob()).await.unwrap();
        assert_eq!(joined.role, MemberRole::Participant);
        assert_eq!(
            h.cache.percent(room.room_id).await,
            Some(ScoreMap::from([("alice".into(), 50), ("bob".into(), 50)]))
        );

        let joined = join_room(&h.state, &format!(" {} ", room.observer_code), carol())
            .await
            .unwrap();
        assert_eq!(joined.role, MemberRole::Observer);
    }

    #[tokio::test]
    async fn join_survives_a_failed_score_refresh() {
        let store = ScriptedStore::new();
        let h = Harness::with_store(store.clone());
        let room = create_room(&h.state, alice(), None).await.unwrap();

        store.set_failing_memberships(true);
        let joined = join_room(&h.state, &room.participant_code, bob()).await.unwrap();
        assert_eq!(joined.role, MemberRole::Participant);
        assert!(h.store.find_membership(room.room_id, 2).await.unwrap().is_some());
        // No stale score map is left behind for the poll to serve.
        assert_eq!(h.cache.percent(room.room_id).await, None);

        store.set_failing_memberships(false);
        let response = poll(&h.state, room.room_id, None, &bob()).await.unwrap();
        assert_eq!(
            response.percent,
            ScoreMap::from([("alice".into(), 50), ("bob".into(), 50)])
        );
    }

    #[tokio::test]
    async fn join_rejects_unknown_code_rejoin_and_third_participant() {
        let h = Harness::new();
        let room = create_room(&h.state, alice(), None).await.unwrap();
        join_room(&h.state, &room.participant_code, bob()).await.unwrap();

        assert!(matches!(
            join_room(&h.state, "0000-0000x", dave()).await,
            Err(ServiceError::InvalidInviteCode)
        ));
        assert!(matches!(
            join_room(&h.state, &room.observer_code, bob()).await,
            Err(ServiceError::AlreadyJoined(_))
        ));
        assert!(matches!(
            join_room(&h.state, &room.participant_code, dave()).await,
            Err(ServiceError::RoomFull(_))
        ));
        // Observers are not capped.
        join_room(&h.state, &room.observer_code, dave()).await.unwrap();
    }

    #[tokio::test]
    async fn exit_request_then_acceptance_queues_the_verdict() {
        let mut h = Harness::new();
        let room_id = h.debate().await;

        let requested = request_exit(&h.state, room_id, bob()).await.unwrap();
        assert_eq!(requested.status, RoomStatus::ExitRequested);
        assert_eq!(requested.requester_nickname, "bob");
        assert_eq!(
            h.cache.status(room_id).await,
            Some(StatusSnapshot::new(RoomStatus::ExitRequested, Some("bob".into())))
        );

        let decided = decide_exit(&h.state, room_id, alice(), true).await.unwrap();
        assert!(decided.approved);
        assert_eq!(decided.status, RoomStatus::ExitAccepted);

        let room = h.store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::ExitAccepted);
        assert_eq!(room.exit_requester, None);

        let job = h.next_job().await;
        assert_eq!((job.room_id, job.kind), (room_id, JobKind::Verdict));
    }

    #[tokio::test]
    async fn rejection_resumes_the_debate_and_allows_a_new_request() {
        let mut h = Harness::new();
        let room_id = h.debate().await;

        request_exit(&h.state, room_id, alice()).await.unwrap();
        let decided = decide_exit(&h.state, room_id, bob(), false).await.unwrap();
        assert_eq!(decided.status, RoomStatus::Alive);
        assert_eq!(
            h.cache.status(room_id).await,
            Some(StatusSnapshot::new(RoomStatus::Alive, None))
        );
        assert!(h.drain_jobs().await.is_empty());

        let again = request_exit(&h.state, room_id, alice()).await.unwrap();
        assert_eq!(again.status, RoomStatus::ExitRequested);
    }

    #[tokio::test]
    async fn exit_workflow_enforces_roles_and_state() {
        let h = Harness::new();
        let room_id = h.debate().await;

        assert!(matches!(
            decide_exit(&h.state, room_id, alice(), true).await,
            Err(ServiceError::NoExitRequest(_))
        ));
        assert!(matches!(
            request_exit(&h.state, room_id, carol()).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            request_exit(&h.state, room_id, dave()).await,
            Err(ServiceError::NotMember(_))
        ));
        assert!(matches!(
            request_exit(&h.state, room_id + 100, alice()).await,
            Err(ServiceError::RoomNotFound(_))
        ));

        request_exit(&h.state, room_id, alice()).await.unwrap();
        assert!(matches!(
            request_exit(&h.state, room_id, bob()).await,
            Err(ServiceError::ExitAlreadyRequested(_))
        ));
        assert!(matches!(
            decide_exit(&h.state, room_id, alice(), true).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            decide_exit(&h.state, room_id, carol(), true).await,
            Err(ServiceError::PermissionDenied(_))
        ));

        let room = h.store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::ExitRequested);
        assert_eq!(room.exit_requester, Some(alice()));
    }

    #[tokio::test]
    async fn concurrent_decisions_apply_exactly_once() {
        let h = Harness::new();
        let room_id = h.debate().await;
        request_exit(&h.state, room_id, alice()).await.unwrap();
        let before = h.store.find_room(room_id).await.unwrap().unwrap().version;

        let (accept, reject) = tokio::join!(
            decide_exit(&h.state, room_id, bob(), true),
            decide_exit(&h.state, room_id, bob(), false),
        );
        let succeeded = [accept.is_ok(), reject.is_ok()];
        assert_eq!(succeeded.iter().filter(|ok| **ok).count(), 1);

        let failure = accept.err().or(reject.err()).unwrap();
        assert!(matches!(
            failure,
            ServiceError::ConcurrentUpdate(_) | ServiceError::NoExitRequest(_)
        ));

        let room = h.store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.version, before + 1);
    }

    #[tokio::test]
    async fn retry_requires_a_room_awaiting_judgment() {
        let mut h = Harness::new();
        let room_id = h.debate().await;

        assert!(matches!(
            retry_judgment(&h.state, room_id, alice()).await,
            Err(ServiceError::InvalidState(_))
        ));

        request_exit(&h.state, room_id, alice()).await.unwrap();
        decide_exit(&h.state, room_id, bob(), true).await.unwrap();
        h.next_job().await;

        assert!(matches!(
            retry_judgment(&h.state, room_id, carol()).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        let retried = retry_judgment(&h.state, room_id, alice()).await.unwrap();
        assert!(retried.queued);
        assert_eq!(h.next_job().await.kind, JobKind::Verdict);
    }
}
