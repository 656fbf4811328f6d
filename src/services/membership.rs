//! Lookups shared by the room, message, poll and judgment services.

use std::sync::Arc;

use crate::{
    cache::ScoreMap,
    dao::{
        debate_store::DebateStore,
        models::{MembershipEntity, RoomEntity, RoomId, UserId, UserRef},
    },
    error::ServiceError,
};

pub(crate) async fn require_room(
    store: &Arc<dyn DebateStore>,
    room_id: RoomId,
) -> Result<RoomEntity, ServiceError> {
    store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))
}

/// Load the caller's membership straight from the durable store.
///
/// Fails `RoomNotFound` when the room does not exist and `NotMember` otherwise.
pub(crate) async fn require_member(
    store: &Arc<dyn DebateStore>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<MembershipEntity, ServiceError> {
    if let Some(membership) = store.find_membership(room_id, user_id).await? {
        return Ok(membership);
    }

    match store.find_room(room_id).await? {
        Some(_) => Err(ServiceError::NotMember(room_id)),
        None => Err(ServiceError::RoomNotFound(room_id)),
    }
}

pub(crate) fn require_participant(membership: &MembershipEntity) -> Result<(), ServiceError> {
    if membership.is_participant() {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(
            "observers cannot take part in the debate".into(),
        ))
    }
}

/// Conviction score of every participant, keyed by nickname.
pub(crate) fn score_map(memberships: &[MembershipEntity]) -> ScoreMap {
    memberships
        .iter()
        .filter(|membership| membership.is_participant())
        .map(|membership| (membership.user.nickname.clone(), membership.conviction_score))
        .collect()
}

/// The two debaters of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Debaters {
    /// The room creator.
    pub plaintiff: UserRef,
    pub defendant: UserRef,
}

/// Pick the creator as plaintiff and the first other participant as defendant.
pub(crate) fn debaters(room: &RoomEntity, memberships: &[MembershipEntity]) -> Option<Debaters> {
    let mut participants = memberships.iter().filter(|membership| membership.is_participant());
    let plaintiff = participants
        .clone()
        .find(|membership| membership.user.id == room.creator.id)?;
    let defendant = participants.find(|membership| membership.user.id != room.creator.id)?;

    Some(Debaters {
        plaintiff: plaintiff.user.clone(),
        defendant: defendant.user.clone(),
    })
}
