//! Account endpoints. These are the only `/v1` routes open to callers
//! without an identity.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::UserId;
use serde::Deserialize;

use super::{Created, Envelope, data};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::{AppState, Store};

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// POST /v1/auth/sign-up
#[tracing::instrument(skip(state, credentials), fields(username = %credentials.username))]
pub async fn sign_up<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<(StatusCode, Json<Envelope<Created<UserId>>>), ApiError> {
    let id = state
        .users
        .sign_up(&credentials.username, &credentials.password)
        .await?;
    Ok((StatusCode::CREATED, data(Created { id })))
}

/// POST /v1/auth/sign-in: answers with the id to send as `X-User-Id`.
#[tracing::instrument(skip(state, credentials), fields(username = %credentials.username))]
pub async fn sign_in<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> Result<Json<Envelope<Created<UserId>>>, ApiError> {
    let user = state
        .users
        .sign_in(&credentials.username, &credentials.password)
        .await?;
    Ok(data(Created { id: user.id }))
}
