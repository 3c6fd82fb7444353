//! Bounding external calls in time and moving blocking work off the runtime.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tracing::warn;

use crate::{RagError, Result};

/// Await `future`, failing with [`RagError::Timeout`] once `limit` elapses
#[inline]
pub async fn with_deadline<T, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", operation, limit);
            Err(RagError::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            })
        }
    }
}

/// Run a blocking closure on the blocking thread pool
#[inline]
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::Other(anyhow!("blocking task failed: {}", e)))?
}
