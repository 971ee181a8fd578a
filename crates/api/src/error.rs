//! API error types with HTTP response mapping.
//!
//! [`map_error`] is the only place that turns a classified error into text a
//! client sees. 5xx responses carry a fixed message; the full chain from
//! [`DomainError::describe`] goes to the log only.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{Cause, DomainError, ErrorKind};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A classified error from the lower layers.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The caller acts on behalf of another user.
    #[error("forbidden")]
    Forbidden,
    /// A path id was empty.
    #[error("missing id parameter")]
    MissingId,
}

/// What the transport does with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub status: StatusCode,
    /// Sent to the client.
    pub client_message: String,
    /// Logged, never sent.
    pub debug_message: String,
}

/// Text of the innermost error: its opaque cause if it has one, else its
/// own message.
fn innermost_detail(err: &DomainError) -> String {
    match err.cause() {
        Some(Cause::Opaque(root)) => root.to_string(),
        _ => err.message().to_string(),
    }
}

fn map_domain_error(err: &DomainError) -> (StatusCode, String) {
    let inner = err.classify();
    let own = || inner.message().to_string();

    match inner.own_kind() {
        ErrorKind::InvalidArgument | ErrorKind::MalformedRequest => (StatusCode::BAD_REQUEST, own()),
        ErrorKind::APIAuthorization => {
            (StatusCode::UNAUTHORIZED, "authorization failed".to_string())
        }
        ErrorKind::UserCredentials => (StatusCode::OK, "invalid credentials".to_string()),
        ErrorKind::NotPermitted | ErrorKind::Private => (StatusCode::FORBIDDEN, own()),
        ErrorKind::InvalidOperation => (StatusCode::METHOD_NOT_ALLOWED, own()),
        ErrorKind::Logic => (StatusCode::CONFLICT, own()),
        ErrorKind::Exist => (StatusCode::CREATED, own()),
        ErrorKind::NotExist => (StatusCode::NOT_FOUND, "not found".to_string()),
        ErrorKind::Validation => (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("validation failed: {}", innermost_detail(inner)),
        ),
        ErrorKind::DatabaseConnection | ErrorKind::RemoteConnection | ErrorKind::IO => (
            StatusCode::SERVICE_UNAVAILABLE,
            "server error, try later".to_string(),
        ),
        ErrorKind::Database
        | ErrorKind::Internal
        | ErrorKind::Other
        | ErrorKind::Unanticipated
        | ErrorKind::BrokenLink => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        ),
    }
}

/// Decides the status and client text of an error.
pub fn map_error(err: &ApiError) -> ErrorDetails {
    match err {
        ApiError::Domain(inner) => {
            let (status, client_message) = map_domain_error(inner);
            ErrorDetails {
                status,
                client_message,
                debug_message: inner.describe(),
            }
        }
        ApiError::Forbidden => sentinel(StatusCode::FORBIDDEN, err),
        ApiError::MissingId => sentinel(StatusCode::BAD_REQUEST, err),
    }
}

fn sentinel(status: StatusCode, err: &ApiError) -> ErrorDetails {
    ErrorDetails {
        status,
        client_message: err.to_string(),
        debug_message: err.to_string(),
    }
}

fn log(details: &ErrorDetails) {
    let status = details.status.as_u16();
    let client_message = details.client_message.as_str();
    if details.status.is_server_error() {
        tracing::error!(status, client_message, "request failed");
    } else if details.status.is_client_error() {
        tracing::warn!(status, client_message, "request failed");
    } else {
        tracing::debug!(status, client_message, "request failed");
    }
    tracing::info!(status, chain = %details.debug_message, "error chain");
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = map_error(&self);
        log(&details);
        metrics::counter!("http_errors_total", "status" => details.status.as_u16().to_string())
            .increment(1);

        let body = serde_json::json!({ "ok": false, "message": details.client_message });
        (details.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(kind: ErrorKind) -> ApiError {
        let root = DomainError::wrap(kind, "pq: secret table users_v2", "inner detail");
        DomainError::wrap(ErrorKind::Database, root, "error from orders repo").into()
    }

    #[test]
    fn every_kind_has_a_mapping() {
        for kind in ErrorKind::ALL {
            let details = map_error(&wrapped(kind));
            assert!(!details.client_message.is_empty(), "{kind:?}");
            assert_eq!(
                details.debug_message,
                "error from orders repo: inner detail: pq: secret table users_v2"
            );
        }
    }

    #[test]
    fn server_errors_hide_the_chain() {
        for kind in ErrorKind::ALL {
            let details = map_error(&wrapped(kind));
            if details.status.is_server_error() {
                assert!(!details.client_message.contains("inner detail"), "{kind:?}");
                assert!(!details.client_message.contains("users_v2"), "{kind:?}");
                assert!(!details.client_message.contains("orders repo"), "{kind:?}");
            }
        }
    }

    #[test]
    fn status_table() {
        let cases = [
            (ErrorKind::InvalidArgument, 400, "inner detail"),
            (ErrorKind::MalformedRequest, 400, "inner detail"),
            (ErrorKind::APIAuthorization, 401, "authorization failed"),
            (ErrorKind::UserCredentials, 200, "invalid credentials"),
            (ErrorKind::NotPermitted, 403, "inner detail"),
            (ErrorKind::Private, 403, "inner detail"),
            (ErrorKind::InvalidOperation, 405, "inner detail"),
            (ErrorKind::Logic, 409, "inner detail"),
            (ErrorKind::Exist, 201, "inner detail"),
            (ErrorKind::NotExist, 404, "not found"),
            (
                ErrorKind::Validation,
                422,
                "validation failed: pq: secret table users_v2",
            ),
            (ErrorKind::Database, 500, "internal server error"),
            (ErrorKind::Internal, 500, "internal server error"),
            (ErrorKind::Other, 500, "internal server error"),
            (ErrorKind::Unanticipated, 500, "internal server error"),
            (ErrorKind::BrokenLink, 500, "internal server error"),
            (ErrorKind::DatabaseConnection, 503, "server error, try later"),
            (ErrorKind::RemoteConnection, 503, "server error, try later"),
            (ErrorKind::IO, 503, "server error, try later"),
        ];
        assert_eq!(cases.len(), ErrorKind::ALL.len());

        for (kind, status, message) in cases {
            let details = map_error(&wrapped(kind));
            assert_eq!(details.status.as_u16(), status, "{kind:?}");
            assert_eq!(details.client_message, message, "{kind:?}");
        }
    }

    #[test]
    fn validation_without_cause_uses_message() {
        let err: ApiError = DomainError::new(ErrorKind::Validation, "number: must be positive").into();
        assert_eq!(
            map_error(&err).client_message,
            "validation failed: number: must be positive"
        );
    }

    #[test]
    fn sentinels() {
        let forbidden = map_error(&ApiError::Forbidden);
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.client_message, "forbidden");

        let missing = map_error(&ApiError::MissingId);
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.client_message, "missing id parameter");
    }

    #[tokio::test]
    async fn response_body_is_the_envelope() {
        let response = wrapped(ErrorKind::Logic).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "ok": false, "message": "inner detail" }));
    }
}
