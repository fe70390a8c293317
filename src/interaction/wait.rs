//! Condition poller: re-evaluate a predicate against the live page until it
//! holds or a timeout elapses. Never a fixed sleep; never busy.
//!
//! A probe that fails with a stale-reference (or vanished-element) error
//! mid-poll counts as "not yet true" for that iteration — the node is being
//! replaced, and the next poll re-reads live state.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use crate::error::{DriverError, ScopeError};

fn poll_tolerable(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::Scope(ScopeError::Stale(_)) | DriverError::Scope(ScopeError::NotFound(_))
    )
}

/// Re-run `probe` every `interval` until it returns `Ok(true)` or `timeout`
/// elapses. The probe is always evaluated at least once.
pub async fn wait_until<'a, F>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<(), DriverError>
where
    F: FnMut() -> BoxFuture<'a, Result<bool, DriverError>> + Send,
{
    let started = Instant::now();
    loop {
        match probe().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if poll_tolerable(&e) => {}
            Err(e) => return Err(e),
        }
        if started.elapsed() >= timeout {
            return Err(DriverError::Timeout {
                what: what.to_string(),
                waited: started.elapsed(),
                last_seen: None,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Dual of [`wait_until`]: succeed once the probe reports the condition no
/// longer holds. A stale probe means the node is mid-replacement and counts
/// as "still present".
pub async fn wait_for_absence<'a, F>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<(), DriverError>
where
    F: FnMut() -> BoxFuture<'a, Result<bool, DriverError>> + Send,
{
    let started = Instant::now();
    loop {
        match probe().await {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(e) if poll_tolerable(&e) => {}
            Err(e) => return Err(e),
        }
        if started.elapsed() >= timeout {
            return Err(DriverError::Timeout {
                what: what.to_string(),
                waited: started.elapsed(),
                last_seen: None,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Re-run `produce` until its output equals `expected`. On timeout the error
/// carries the last observed value for diagnostics.
pub async fn wait_for_equality<'a, T, F>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut produce: F,
    expected: &T,
) -> Result<(), DriverError>
where
    T: PartialEq + Debug,
    F: FnMut() -> BoxFuture<'a, Result<T, DriverError>> + Send,
{
    let started = Instant::now();
    let mut last_seen = None;
    loop {
        match produce().await {
            Ok(actual) => {
                if &actual == expected {
                    return Ok(());
                }
                last_seen = Some(format!("{actual:?}"));
            }
            Err(e) if poll_tolerable(&e) => {}
            Err(e) => return Err(e),
        }
        if started.elapsed() >= timeout {
            return Err(DriverError::Timeout {
                what: what.to_string(),
                waited: started.elapsed(),
                last_seen,
            });
        }
        tokio::time::sleep(interval).await;
    }
}
