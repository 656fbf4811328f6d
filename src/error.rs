use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{
        models::{RoomId, RoomStatus},
        storage::StorageError,
    },
    state::room_machine::{InvalidTransition, RoomEvent},
};

/// Broad failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Room, membership or judgment absent.
    NotFound,
    /// Wrong role or self-approval.
    PermissionDenied,
    /// The room's state forbids the operation.
    Conflict,
    /// Malformed input or unknown invite code.
    InvalidInput,
    /// The durable store could not be reached.
    Unavailable,
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No room with this id.
    #[error("room {0} does not exist")]
    RoomNotFound(RoomId),
    /// The verdict has not been written yet.
    #[error("room {0} has no judgment yet")]
    JudgmentNotFound(RoomId),
    /// The caller has no membership in the room.
    #[error("user is not a member of room {0}")]
    NotMember(RoomId),
    /// The caller's role does not allow the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The room is closed for good.
    #[error("room {0} is closed")]
    RoomClosed(RoomId),
    /// Both participant seats are taken.
    #[error("room {0} already has two participants")]
    RoomFull(RoomId),
    /// The caller is already a member.
    #[error("user already joined room {0}")]
    AlreadyJoined(RoomId),
    /// No exit request is waiting for a decision.
    #[error("room {0} has no pending exit request")]
    NoExitRequest(RoomId),
    /// An exit request is already waiting for a decision.
    #[error("room {0} already has a pending exit request")]
    ExitAlreadyRequested(RoomId),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Another request modified the room first; retrying is safe.
    #[error("room {0} was modified concurrently")]
    ConcurrentUpdate(RoomId),
    /// No room uses this invite code.
    #[error("invite code does not match any room")]
    InvalidInviteCode,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ServiceError {
    /// Category the error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unavailable(_) => ErrorKind::Unavailable,
            ServiceError::RoomNotFound(_)
            | ServiceError::JudgmentNotFound(_)
            | ServiceError::NotMember(_) => ErrorKind::NotFound,
            ServiceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ServiceError::RoomClosed(_)
            | ServiceError::RoomFull(_)
            | ServiceError::AlreadyJoined(_)
            | ServiceError::NoExitRequest(_)
            | ServiceError::ExitAlreadyRequested(_)
            | ServiceError::InvalidState(_)
            | ServiceError::ConcurrentUpdate(_) => ErrorKind::Conflict,
            ServiceError::InvalidInviteCode | ServiceError::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// Stable machine-readable code exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) => "STORAGE_UNAVAILABLE",
            ServiceError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            ServiceError::JudgmentNotFound(_) => "JUDGMENT_NOT_FOUND",
            ServiceError::NotMember(_) => "NOT_MEMBER",
            ServiceError::PermissionDenied(_) => "PERMISSION_DENIED",
            ServiceError::RoomClosed(_) => "ROOM_CLOSED",
            ServiceError::RoomFull(_) => "ROOM_FULL",
            ServiceError::AlreadyJoined(_) => "ALREADY_JOINED",
            ServiceError::NoExitRequest(_) => "NO_EXIT_REQUEST",
            ServiceError::ExitAlreadyRequested(_) => "EXIT_ALREADY_REQUESTED",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            ServiceError::InvalidInviteCode => "INVALID_INVITE_CODE",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Map a rejected transition of `room_id` to the error callers see.
    pub fn from_transition(room_id: RoomId, err: InvalidTransition) -> Self {
        match (err.from, err.event) {
            (RoomStatus::Closed, _) => ServiceError::RoomClosed(room_id),
            (_, RoomEvent::AcceptExit | RoomEvent::RejectExit) => {
                ServiceError::NoExitRequest(room_id)
            }
            (RoomStatus::ExitRequested, RoomEvent::RequestExit { .. }) => {
                ServiceError::ExitAlreadyRequested(room_id)
            }
            (RoomStatus::ExitAccepted, RoomEvent::RequestExit { .. }) => {
                ServiceError::InvalidState(format!("room {room_id} is awaiting its judgment"))
            }
            (from, event) => {
                ServiceError::InvalidState(format!("{event:?} is not allowed while {from}"))
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict { room_id, .. } => {
                ServiceError::ConcurrentUpdate(room_id)
            }
            StorageError::Duplicate { entity, key } => {
                ServiceError::InvalidState(format!("duplicate {entity}: {key}"))
            }
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest {
            code: "VALIDATION_FAILED",
            message: format!("validation failed: {}", err),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    /// Missing or malformed caller identity.
    #[error("unauthorized: {message}")]
    Unauthorized { code: &'static str, message: String },
    /// Caller lacks the required role.
    #[error("forbidden: {message}")]
    Forbidden { code: &'static str, message: String },
    /// Requested resource not found.
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String },
    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String },
    /// Service unavailable or degraded.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { code: &'static str, message: String },
}

impl AppError {
    /// Missing or malformed identity headers.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            code: "UNAUTHENTICATED",
            message: message.into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code),
            AppError::Unauthorized { code, .. } => (StatusCode::UNAUTHORIZED, *code),
            AppError::Forbidden { code, .. } => (StatusCode::FORBIDDEN, *code),
            AppError::NotFound { code, .. } => (StatusCode::NOT_FOUND, *code),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::ServiceUnavailable { code, .. } => (StatusCode::SERVICE_UNAVAILABLE, *code),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound { code, message },
            ErrorKind::PermissionDenied => AppError::Forbidden { code, message },
            ErrorKind::Conflict => AppError::Conflict { code, message },
            ErrorKind::InvalidInput => AppError::BadRequest { code, message },
            ErrorKind::Unavailable => AppError::ServiceUnavailable { code, message },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.parts();

        let payload = Json(ErrorBody {
            code,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
