//! Bounded client-side timeout for backend calls.

use std::future::Future;
use std::time::Duration;

use chat_core::BackendError;

/// Runs `fut`, turning an overrun of `limit` into [`BackendError::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}
