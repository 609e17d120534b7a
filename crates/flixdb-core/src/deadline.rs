//! Per-stage time bounds.

use crate::error::{Error, Result, Stage};
use std::future::Future;
use std::time::{Duration, Instant};

/// Runs `fut` with an upper bound. Elapsing maps to `Error::Timeout` tagged
/// with `stage`; the inner future is dropped.
pub async fn bounded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(out) => out,
        Err(_) => {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(stage = %stage, elapsed_ms, "stage timed out");
            Err(Error::Timeout { stage, elapsed_ms })
        }
    }
}

/// Runs a synchronous store call on the blocking pool so that an enclosing
/// [`bounded`] can time it out. A call that outlives its bound still runs to
/// completion in the background.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(Error::index)?
}
