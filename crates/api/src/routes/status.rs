//! Server status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{AppState, Store};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub environment: String,
    pub server_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
}

/// GET /status: server time, start time and uptime.
pub async fn get<S: Store>(State(state): State<Arc<AppState<S>>>) -> Json<StatusResponse> {
    let now = Utc::now();
    Json(StatusResponse {
        environment: state.environment.clone(),
        server_time: now,
        started_at: state.started_at,
        uptime_seconds: (now - state.started_at).num_seconds(),
    })
}
