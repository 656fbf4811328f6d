//! Cache-aside poll: one read returning new messages, room status and conviction scores.

use tracing::{debug, warn};

use crate::{
    cache::{ScoreMap, StatusSnapshot},
    dao::models::{MessageEntity, MessageId, RoomEntity, RoomId, UserRef},
    dto::{message::MessageDto, poll::PollResponse},
    error::ServiceError,
    services::membership::{require_member, require_room, score_map},
    state::SharedState,
};

/// Return what changed in the room since `last_seen`.
///
/// Membership is always checked against the durable store. Room data comes from the cache
/// when all of it is present, otherwise from the store, which then repopulates the cache.
pub async fn poll(
    state: &SharedState,
    room_id: RoomId,
    last_seen: Option<MessageId>,
    user: &UserRef,
) -> Result<PollResponse, ServiceError> {
    let last_seen = last_seen.unwrap_or(0).max(0);
    require_member(state.store(), room_id, user.id).await?;

    if let Some(response) = poll_cached(state, room_id, last_seen).await? {
        return Ok(response);
    }
    poll_durable(state, room_id, last_seen).await
}

async fn poll_cached(
    state: &SharedState,
    room_id: RoomId,
    last_seen: MessageId,
) -> Result<Option<PollResponse>, ServiceError> {
    let cache = state.cache();
    let Some(cached_last) = cache.last_message_id(room_id).await else {
        return Ok(None);
    };
    let (Some(percent), Some(status)) = (cache.percent(room_id).await, cache.status(room_id).await)
    else {
        return Ok(None);
    };

    let messages = if cached_last > last_seen {
        state.store().messages_after(room_id, last_seen).await?
    } else {
        Vec::new()
    };

    debug!(room_id, last_seen, cached_last, "poll served from cache");
    Ok(Some(response(messages, status, percent)))
}

async fn poll_durable(
    state: &SharedState,
    room_id: RoomId,
    last_seen: MessageId,
) -> Result<PollResponse, ServiceError> {
    let store = state.store();
    let room = require_room(store, room_id).await?;
    let messages = store.messages_after(room_id, last_seen).await?;
    let percent = score_map(&store.list_memberships(room_id).await?);
    let status = StatusSnapshot::new(
        room.status,
        room.exit_requester
            .as_ref()
            .map(|requester| requester.nickname.clone()),
    );

    // Never below the room's real last id: messages_after returned everything past
    // `last_seen`, so the newest of them is the room's last id when there are any.
    let last_message_id = messages.last().map_or(last_seen, |message| message.id);
    let cache = state.cache();
    cache.set_last_message_id(room_id, last_message_id).await;
    cache.set_percent(room_id, &percent).await;
    cache_fresh_status(state, &room).await;

    debug!(room_id, last_seen, last_message_id, "poll served from store; cache repopulated");
    Ok(response(messages, status, percent))
}

/// Cache the room's status as stored right now, so a transition committed while this poll
/// was reading is not overwritten by the older snapshot.
async fn cache_fresh_status(state: &SharedState, read: &RoomEntity) {
    let current = match state.store().find_room(read.id).await {
        Ok(Some(room)) => room,
        Ok(None) => return,
        Err(err) => {
            warn!(room_id = read.id, error = %err, "room re-read failed; status not cached");
            return;
        }
    };
    if current.version != read.version {
        debug!(room_id = read.id, "room changed during poll; caching its newer status");
    }

    let snapshot = StatusSnapshot::new(
        current.status,
        current.exit_requester.map(|requester| requester.nickname),
    );
    state.cache().set_status(read.id, &snapshot).await;
}

fn response(messages: Vec<MessageEntity>, status: StatusSnapshot, percent: ScoreMap) -> PollResponse {
    PollResponse {
        messages: messages.into_iter().map(MessageDto::from).collect(),
        status: status.status,
        finish_requester_nickname: status.requester_nickname,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cache::{NoopCache, testing::FailingCache},
        dao::models::RoomStatus,
        services::{
            message_service::send_message,
            room_service::request_exit,
            test_support::{Harness, ScriptedStore, alice, bob, carol, dave},
        },
    };

    fn ids(response: &PollResponse) -> Vec<MessageId> {
        response.messages.iter().map(|message| message.id).collect()
    }

    #[tokio::test]
    async fn poll_returns_only_newer_messages() {
        let h = Harness::new();
        let room_id = h.debate().await;
        let first = send_message(&h.state, room_id, alice(), "one").await.unwrap();
        let second = send_message(&h.state, room_id, bob(), "two").await.unwrap();

        let all = poll(&h.state, room_id, None, &carol()).await.unwrap();
        assert_eq!(ids(&all), [first.id, second.id]);
        assert_eq!(all.status, RoomStatus::Alive);
        assert_eq!(all.finish_requester_nickname, None);
        assert_eq!(
            all.percent,
            ScoreMap::from([("alice".into(), 50), ("bob".into(), 50)])
        );

        let delta = poll(&h.state, room_id, Some(first.id), &carol()).await.unwrap();
        assert_eq!(ids(&delta), [second.id]);

        let caught_up = poll(&h.state, room_id, Some(second.id), &alice()).await.unwrap();
        assert!(caught_up.messages.is_empty());
    }

    #[tokio::test]
    async fn poll_requires_membership() {
        let h = Harness::new();
        let room_id = h.debate().await;

        assert!(matches!(
            poll(&h.state, room_id, None, &dave()).await,
            Err(ServiceError::NotMember(_))
        ));
        assert!(matches!(
            poll(&h.state, room_id + 100, None, &alice()).await,
            Err(ServiceError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_cache_degrades_to_the_store() {
        let h = Harness::with_cache(Arc::new(FailingCache));
        let room_id = h.debate().await;

        let first = send_message(&h.state, room_id, alice(), "one").await.unwrap();
        let second = send_message(&h.state, room_id, bob(), "two").await.unwrap();
        request_exit(&h.state, room_id, bob()).await.unwrap();

        let response = poll(&h.state, room_id, Some(first.id), &carol()).await.unwrap();
        assert_eq!(ids(&response), [second.id]);
        assert_eq!(response.status, RoomStatus::ExitRequested);
        assert_eq!(response.finish_requester_nickname.as_deref(), Some("bob"));
        assert_eq!(
            response.percent,
            ScoreMap::from([("alice".into(), 50), ("bob".into(), 50)])
        );

        let again = poll(&h.state, room_id, Some(first.id), &carol()).await.unwrap();
        assert_eq!(again, response);
    }

    #[tokio::test]
    async fn cached_and_durable_paths_agree() {
        let cached = Harness::new();
        let uncached = cached.sharing_store(Arc::new(NoopCache));
        let room_id = cached.debate().await;

        let first = send_message(&cached.state, room_id, alice(), "one").await.unwrap();
        send_message(&cached.state, room_id, bob(), "two").await.unwrap();
        request_exit(&cached.state, room_id, alice()).await.unwrap();

        for last_seen in [None, Some(0), Some(first.id), Some(first.id + 1)] {
            let via_cache = poll(&cached.state, room_id, last_seen, &carol()).await.unwrap();
            let via_store = poll(&uncached.state, room_id, last_seen, &carol()).await.unwrap();
            assert_eq!(via_cache, via_store, "last_seen = {last_seen:?}");
        }
    }

    #[tokio::test]
    async fn miss_repopulates_every_entry() {
        let h = Harness::new();
        let room_id = h.debate().await;
        let message = send_message(&h.state, room_id, alice(), "one").await.unwrap();
        request_exit(&h.state, room_id, alice()).await.unwrap();

        h.cache.invalidate(room_id).await;
        let from_store = poll(&h.state, room_id, None, &bob()).await.unwrap();

        assert_eq!(h.cache.last_message_id(room_id).await, Some(message.id));
        assert_eq!(
            h.cache.status(room_id).await,
            Some(StatusSnapshot::new(
                RoomStatus::ExitRequested,
                Some("alice".into())
            ))
        );
        assert_eq!(h.cache.percent(room_id).await, Some(from_store.percent.clone()));

        let from_cache = poll(&h.state, room_id, None, &bob()).await.unwrap();
        assert_eq!(from_cache, from_store);
    }

    #[tokio::test]
    async fn partial_cache_falls_back_to_the_store() {
        let h = Harness::new();
        let room_id = h.debate().await;
        send_message(&h.state, room_id, alice(), "one").await.unwrap();
        request_exit(&h.state, room_id, bob()).await.unwrap();

        // Only the last message id survives.
        h.cache.invalidate(room_id).await;
        h.cache.set_last_message_id(room_id, 1).await;

        let response = poll(&h.state, room_id, None, &alice()).await.unwrap();
        assert_eq!(response.status, RoomStatus::ExitRequested);
        assert_eq!(response.finish_requester_nickname.as_deref(), Some("bob"));
        assert_eq!(response.messages.len(), 1);
    }

    #[tokio::test]
    async fn empty_room_caches_zero_as_last_id() {
        let h = Harness::new();
        let room_id = h.debate().await;
        h.cache.invalidate(room_id).await;

        let response = poll(&h.state, room_id, None, &alice()).await.unwrap();
        assert!(response.messages.is_empty());
        assert_eq!(h.cache.last_message_id(room_id).await, Some(0));
    }

    #[tokio::test]
    async fn exit_committed_during_a_poll_is_not_masked_in_the_cache() {
        let store = ScriptedStore::new();
        let h = Harness::with_store(store.clone());
        let room_id = h.debate().await;
        h.cache.invalidate(room_id).await;

        store.request_exit_during_next_read(bob());
        let response = poll(&h.state, room_id, None, &carol()).await.unwrap();
        // The response reflects the room as first read.
        assert_eq!(response.status, RoomStatus::Alive);

        assert_eq!(
            h.cache.status(room_id).await,
            Some(StatusSnapshot::new(
                RoomStatus::ExitRequested,
                Some("bob".into())
            ))
        );
        let next = poll(&h.state, room_id, None, &carol()).await.unwrap();
        assert_eq!(next.status, RoomStatus::ExitRequested);
        assert_eq!(next.finish_requester_nickname.as_deref(), Some("bob"));
    }
}
