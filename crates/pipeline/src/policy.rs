//! Generic run-with-policy wrapper.
//!
//! Error handling is a value, not a class hierarchy: each stage carries an
//! [`ErrorPolicy`] and every task runs through [`run_with_policy`], which
//! applies retries and classifies the terminal failure as either fatal to
//! the stream or recordable.

use std::future::Future;
use std::time::Duration;

use databridge_core::ErrorPolicy;

/// What to do with a failure once the policy is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Abort the stream.
    Abort,
    /// Record the failure and continue with the remaining tasks.
    Record,
}

/// A task failure classified by policy.
#[derive(Debug)]
pub struct PolicyFailure<E> {
    /// The final underlying error.
    pub error: E,
    /// Whether the stream aborts or continues.
    pub disposition: Disposition,
    /// How many attempts were made in total.
    pub attempts: u32,
}

/// Run `op` under `policy`.
///
/// `stage_default` is the disposition applied when a retry policy
/// exhausts its attempts: extraction aborts, loading records and
/// continues. `FailFast` and `Continue` carry their own dispositions.
pub async fn run_with_policy<T, E, F, Fut>(
    policy: ErrorPolicy,
    stage_default: Disposition,
    mut op: F,
) -> Result<T, PolicyFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let (max_attempts, backoff, disposition) = match policy {
        ErrorPolicy::FailFast => (1, Duration::ZERO, Disposition::Abort),
        ErrorPolicy::Continue => (1, Duration::ZERO, Disposition::Record),
        ErrorPolicy::Retry {
            attempts,
            backoff_ms,
        } => (
            attempts.max(1),
            Duration::from_millis(backoff_ms),
            stage_default,
        ),
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Task attempt failed, retrying",
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => {
                return Err(PolicyFailure {
                    error,
                    disposition,
                    attempts: attempt,
                })
            }
        }
    }
}
