use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::llm::ports::{AnalysisError, GenerationError};

const MAX_ATTEMPTS: usize = 2;

/// Errors that can report they were caused by a timeout and build one.
pub trait TimeoutAware {
    fn timed_out() -> Self;
    fn is_timeout(&self) -> bool;
}

impl TimeoutAware for AnalysisError {
    fn timed_out() -> Self {
        AnalysisError::Timeout
    }

    fn is_timeout(&self) -> bool {
        matches!(self, AnalysisError::Timeout)
    }
}

impl TimeoutAware for GenerationError {
    fn timed_out() -> Self {
        GenerationError::Timeout
    }

    fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Timeout)
    }
}

/// Runs `call` under `limit`, retrying once when the attempt times out.
///
/// Any other error is returned immediately.
pub async fn call_with_timeout_retry<T, E, F, Fut>(
    operation: &str,
    limit: Duration,
    mut call: F,
) -> Result<T, E>
where
    E: TimeoutAware,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(limit, call()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out()),
        };
        match result {
            Err(err) if err.is_timeout() && attempt < MAX_ATTEMPTS => {
                warn!(
                    "{operation} timed out after {:.1}s (attempt {attempt}/{MAX_ATTEMPTS}); retrying",
                    limit.as_secs_f64()
                );
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_once_after_timeout() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, AnalysisError> =
            call_with_timeout_retry("test", Duration::from_secs(5), || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(AnalysisError::Timeout)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_timeout() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, GenerationError> =
            call_with_timeout_retry("test", Duration::from_secs(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Timeout) }
            })
            .await;
        assert_eq!(result, Err(GenerationError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_remote_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, AnalysisError> =
            call_with_timeout_retry("test", Duration::from_secs(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AnalysisError::RemoteError("500".into())) }
            })
            .await;
        assert_eq!(result, Err(AnalysisError::RemoteError("500".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_become_timeouts() {
        let result: Result<u32, AnalysisError> =
            call_with_timeout_retry("test", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;
        assert_eq!(result, Err(AnalysisError::Timeout));
    }
}
