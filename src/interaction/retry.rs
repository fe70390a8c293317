//! Resilience wrapper: re-run a whole operation body when it fails with a
//! transient error class (stale reference, internal sub-wait timeout), up to
//! a fixed bound. Element handles are never reused across attempts — each
//! attempt re-resolves everything from selectors.

use futures::future::BoxFuture;

use crate::error::DriverError;

/// Default attempt bound for top-level operations.
pub const MAX_ATTEMPTS: usize = 3;

/// Run `body` up to `max_attempts` times. The body receives the 1-based
/// attempt number so first-attempt-only work (e.g. precondition guards) can
/// be skipped on retries. Non-transient errors are returned immediately; the
/// last transient error is returned once the bound is exhausted.
pub async fn retry_transient<'a, T, F>(
    op: &str,
    max_attempts: usize,
    mut body: F,
) -> Result<T, DriverError>
where
    F: FnMut(usize) -> BoxFuture<'a, Result<T, DriverError>> + Send,
{
    let mut attempt = 1;
    loop {
        match body(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                tracing::debug!(op, attempt, error = %e, "retrying after transient failure");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
