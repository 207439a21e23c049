//! Shared helpers for parley integration tests.

pub mod fixtures;

use std::time::Duration;

/// Detect CI environments, where scheduling is slower and noisier.
pub fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
}

/// Scale a wait bound for the current environment
pub fn ci_timeout(base: Duration) -> Duration {
    if is_ci_environment() { base * 3 } else { base }
}

/// Poll `condition` every 10ms until it holds or `limit` elapses.
///
/// Returns whether the condition was observed.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + ci_timeout(limit);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
