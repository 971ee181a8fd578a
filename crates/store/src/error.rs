use common::{Cause, DomainError, ErrorKind};

/// Root message used when a lookup matches no row.
pub const RECORD_NOT_FOUND: &str = "record is not found";

/// Business-rule failure raised inside the allocation transaction.
pub fn insufficient_stock() -> DomainError {
    DomainError::wrap(ErrorKind::Logic, "logical error", "not enough amount in stock")
}

/// Classifies a driver error.
///
/// This is the only place that knows the shapes of `sqlx` errors. Every
/// repository call maps its failure through it before returning.
pub fn classify_db_error(err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::RowNotFound => {
            DomainError::wrap(ErrorKind::NotExist, RECORD_NOT_FOUND, "not found")
        }
        err if is_connection_error(&err) => DomainError::wrap(
            ErrorKind::DatabaseConnection,
            Cause::opaque(err),
            "connection problem",
        ),
        err => DomainError::wrap(ErrorKind::Database, Cause::opaque(err), "db another error"),
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE class 08: connection exception.
        sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("08")),
        _ => false,
    }
}
