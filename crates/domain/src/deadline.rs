use std::future::Future;
use std::time::Duration;

use common::{Cause, DomainError, ErrorKind, Result};

/// Deadline applied to a use case when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `fut` under a deadline.
///
/// When the deadline elapses the future is dropped. An open `sqlx`
/// transaction inside it is dropped with it and rolls back, so nothing is
/// partially committed.
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(elapsed) => {
            tracing::warn!(?timeout, "deadline elapsed");
            Err(DomainError::wrap(
                ErrorKind::IO,
                Cause::opaque(elapsed),
                "operation timed out",
            ))
        }
    }
}
