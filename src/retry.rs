use crate::error::{Result, WrapperError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of [`retry`]. Cancellation surfaces as `Err(WrapperError::Cancelled)`.
pub type RetryResult<T> = Result<T>;

/// Retry policy that ignores the error and keeps going.
pub fn always_retry(_error: &WrapperError) -> bool {
    true
}

/// Retry policy that gives up on the first error.
pub fn never_retry(_error: &WrapperError) -> bool {
    false
}

/// Invoke `operation` at most `max_attempts` times, sleeping `backoff` between
/// failed attempts. Cancellation is checked before each attempt and during
/// the backoff wait; either check ends the loop immediately.
pub async fn retry<T, F, Fut, P>(
    token: &CancellationToken,
    operation_name: &str,
    mut operation: F,
    max_attempts: u32,
    backoff: Duration,
    can_retry: P,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&WrapperError) -> bool,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if token.is_cancelled() {
            warn!(operation = operation_name, "Cancelled, stopping retry");
            return Err(WrapperError::Cancelled);
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        info!(
            operation = operation_name,
            attempt,
            max_attempts,
            error = %err,
            "Attempt failed"
        );

        if !can_retry(&err) {
            return Err(err);
        }
        last_error = Some(err);

        if attempt == max_attempts {
            break;
        }

        tokio::select! {
            _ = token.cancelled() => {
                warn!(operation = operation_name, "Cancelled during backoff, stopping retry");
                return Err(WrapperError::Cancelled);
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    error!(
        operation = operation_name,
        max_attempts, "All retry attempts exhausted"
    );
    Err(last_error.unwrap_or_else(|| {
        WrapperError::system(format!("{} was attempted zero times", operation_name))
    }))
}
