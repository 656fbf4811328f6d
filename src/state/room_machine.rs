//! Lifecycle transitions of a debate room.
//!
//! ```text
//! ALIVE --RequestExit--> EXIT_REQUESTED --AcceptExit--> EXIT_ACCEPTED --CompleteJudgment--> CLOSED
//!   ^                          |
//!   +--------RejectExit--------+
//! ```

use thiserror::Error;

use crate::dao::models::{RoomEntity, RoomStatus, UserRef};

/// Events that move a room through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A participant asks to end the debate.
    RequestExit { requester: UserRef },
    /// The other participant agrees; the verdict becomes pending.
    AcceptExit,
    /// The other participant refuses; the debate resumes.
    RejectExit,
    /// The verdict was written.
    CompleteJudgment,
}

/// Error returned when an event is not allowed from the room's current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// Status the room was in.
    pub from: RoomStatus,
    /// Rejected event.
    pub event: RoomEvent,
}

/// Compute the status reached by applying `event` from `from`.
pub fn next_status(from: RoomStatus, event: &RoomEvent) -> Result<RoomStatus, InvalidTransition> {
    let next = match (from, event) {
        (RoomStatus::Alive, RoomEvent::RequestExit { .. }) => RoomStatus::ExitRequested,
        (RoomStatus::ExitRequested, RoomEvent::AcceptExit) => RoomStatus::ExitAccepted,
        (RoomStatus::ExitRequested, RoomEvent::RejectExit) => RoomStatus::Alive,
        (RoomStatus::ExitAccepted, RoomEvent::CompleteJudgment) => RoomStatus::Closed,
        (from, event) => {
            return Err(InvalidTransition {
                from,
                event: event.clone(),
            });
        }
    };

    Ok(next)
}

/// Apply `event` to `room` in place, keeping `exit_requester` set exactly while the room
/// is in `ExitRequested`.
pub fn apply(room: &mut RoomEntity, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
    let next = next_status(room.status, &event)?;

    room.exit_requester = match event {
        RoomEvent::RequestExit { requester } => Some(requester),
        _ => None,
    };
    room.status = next;

    Ok(next)
}
