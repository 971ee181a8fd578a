//! Route handlers.
//!
//! Successful responses use the `{"ok": true, "data": ...}` envelope; errors
//! are rendered by [`crate::error::ApiError`].

pub mod auth;
pub mod followers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod profiles;
pub mod status;

use axum::Json;
use serde::Serialize;

/// Body of every successful `/v1` response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Wraps `data` in a successful envelope.
pub fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        ok: true,
        data: Some(data),
    })
}

/// A successful envelope with no payload.
pub fn done() -> Json<Envelope<()>> {
    Json(Envelope { ok: true, data: None })
}

/// Id of a newly created resource.
#[derive(Debug, Serialize)]
pub struct Created<I> {
    pub id: I,
}
