//! Follower endpoints. A caller manages their own followers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::UserId;
use store::Follower;

use super::{Envelope, data, done};
use crate::error::ApiError;
use crate::extract::{CallerId, JsonBody, parse_id};
use crate::{AppState, Store};

/// POST /v1/followers: `user_id` must be the caller.
#[tracing::instrument(skip(state))]
pub async fn add<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    JsonBody(follower): JsonBody<Follower>,
) -> Result<Json<Envelope<()>>, ApiError> {
    if follower.user_id != caller {
        return Err(ApiError::Forbidden);
    }
    state.users.add_follower(follower).await?;
    Ok(done())
}

/// GET /v1/followers
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
) -> Result<Json<Envelope<Vec<UserId>>>, ApiError> {
    Ok(data(state.users.followers(caller).await?))
}

/// DELETE /v1/followers/{follower_id}
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(follower_id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let follower_id: UserId = parse_id(&follower_id)?;
    state
        .users
        .remove_follower(Follower {
            user_id: caller,
            follower_id,
        })
        .await?;
    Ok(done())
}
