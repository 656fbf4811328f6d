use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{dao::models::UserRef, error::AppError};

const USER_ID_HEADER: &str = "x-user-id";
const USER_NICKNAME_HEADER: &str = "x-user-nickname";

/// Caller identity asserted by the upstream authentication layer.
///
/// Rejects the request with `401` when either header is missing or malformed.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRef);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("missing user id header `X-User-Id`"))?
            .parse()
            .map_err(|_| AppError::unauthorized("header `X-User-Id` must be an integer"))?;
        let nickname = header(USER_NICKNAME_HEADER).ok_or_else(|| {
            AppError::unauthorized("missing user nickname header `X-User-Nickname`")
        })?;

        Ok(CurrentUser(UserRef::new(id, nickname)))
    }
}
