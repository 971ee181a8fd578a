//! Request extractors that fail with classified errors.

use std::str::FromStr;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use common::{Cause, DomainError, ErrorKind, UserId};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a request is made, taken from `X-User-Id`.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| DomainError::new(ErrorKind::APIAuthorization, "missing user id header"))?;

        let text = header.to_str().map_err(|e| {
            DomainError::wrap(
                ErrorKind::APIAuthorization,
                Cause::opaque(e),
                "unreadable user id header",
            )
        })?;
        let id = text.trim().parse::<UserId>().map_err(|e| {
            DomainError::wrap(
                ErrorKind::APIAuthorization,
                Cause::opaque(e),
                "invalid user id header",
            )
        })?;

        Ok(CallerId(id))
    }
}

/// `axum::Json` whose rejection is a `MalformedRequest` error.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(DomainError::wrap(
                ErrorKind::MalformedRequest,
                rejection.body_text().as_str(),
                "malformed request body",
            )
            .into()),
        }
    }
}

/// Parses an id taken from the path.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::MissingId);
    }
    raw.parse().map_err(|e| {
        DomainError::wrap(ErrorKind::InvalidArgument, Cause::opaque(e), "invalid id").into()
    })
}
