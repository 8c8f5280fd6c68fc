//! Test helper functions and utilities.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
///
/// Uses tokio's clock, so it advances instantly under a paused runtime.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    condition().await
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_immediate() {
        let result = wait_for(Duration::from_secs(1), Duration::from_millis(10), || async {
            true
        })
        .await;
        assert!(result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timeout() {
        let result = wait_for(Duration::from_millis(100), Duration::from_millis(10), || async {
            false
        })
        .await;
        assert!(!result);
    }
}
