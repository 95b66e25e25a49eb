//! Shared transport plumbing for the provider adapters.

use anyhow::Error;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries after the initial call.
const MAX_RETRIES: usize = 3;
/// Delay before the first retry; doubles on each further one.
const BASE_DELAY_MS: u64 = 500;

/// Runs a transport call, retrying failures with doubling backoff. Only the
/// transport error type is retried; payload-level problems (bad status,
/// unparseable body) are the caller's to judge.
pub async fn with_retry<F, Fut, T, E>(mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    let mut delay = Duration::from_millis(BASE_DELAY_MS);
    for attempt in 1..=MAX_RETRIES {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                let err: Error = err.into();
                debug!("Attempt {attempt}/{MAX_RETRIES} failed: {err}. Retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    operation().await.map_err(Into::into)
}
