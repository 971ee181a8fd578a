//! Profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use store::{Profile, ProfileData};

use super::{Envelope, data, done};
use crate::error::ApiError;
use crate::extract::{CallerId, JsonBody, parse_id};
use crate::{AppState, Store};

/// POST /v1/profiles/my
#[tracing::instrument(skip(state, profile))]
pub async fn create_my<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    JsonBody(profile): JsonBody<ProfileData>,
) -> Result<(StatusCode, Json<Envelope<()>>), ApiError> {
    state.profiles.create(caller, profile).await?;
    Ok((StatusCode::CREATED, done()))
}

/// GET /v1/profiles/my
#[tracing::instrument(skip(state))]
pub async fn get_my<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
) -> Result<Json<Envelope<Profile>>, ApiError> {
    Ok(data(state.profiles.get(caller).await?))
}

/// DELETE /v1/profiles/my
#[tracing::instrument(skip(state))]
pub async fn remove_my<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.profiles.remove(caller).await?;
    Ok(done())
}

/// GET /v1/profiles/{id}: anyone's profile, by user id.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Profile>>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(data(state.profiles.get(id).await?))
}

/// PUT /v1/profiles/{id}: only the owner may replace it.
#[tracing::instrument(skip(state, profile))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
    JsonBody(profile): JsonBody<ProfileData>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: UserId = parse_id(&id)?;
    if id != caller {
        return Err(ApiError::Forbidden);
    }
    state.profiles.update(id, profile).await?;
    Ok(done())
}
