//! Time abstraction layer for testable time-dependent operations
//!
//! The dispatcher's pacing sleeps can add up to minutes of wall-clock time.
//! This trait lets tests swap in a provider that skips the delays while
//! production uses the real clock, without conditional compilation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep as tokio_sleep;

/// Trait for providing time-related functionality
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Sleep for the specified duration
    async fn sleep(&self, duration: Duration);

    /// Current UTC instant
    #[must_use]
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current monotonic instant for measuring elapsed budget
    #[must_use]
    fn instant(&self) -> Instant;
}

/// Real time provider for production use
#[derive(Debug, Clone, Default)]
pub struct RealTimeProvider;

impl RealTimeProvider {
    /// Creates a new real time provider
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for RealTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio_sleep(duration).await;
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Mock time provider for testing
///
/// Caps every sleep at one millisecond so pacing-heavy tests run at full
/// speed while async operations still get a chance to yield.
#[derive(Debug, Clone, Default)]
pub struct MockTimeProvider;

impl MockTimeProvider {
    /// Creates a new mock time provider
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for MockTimeProvider {
    async fn sleep(&self, duration: Duration) {
        if duration > Duration::from_millis(1) {
            tokio_sleep(Duration::from_millis(1)).await;
        }
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Type alias for a shared time provider
pub type SharedTimeProvider = Arc<dyn TimeProvider>;

/// Create a production time provider
#[must_use]
pub fn production_time_provider() -> SharedTimeProvider {
    Arc::new(RealTimeProvider::new())
}

/// Create a test time provider that skips pacing delays
#[must_use]
pub fn test_time_provider() -> SharedTimeProvider {
    Arc::new(MockTimeProvider::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_skips_long_sleeps() {
        let provider = MockTimeProvider::new();
        let start = Instant::now();
        provider.sleep(Duration::from_secs(10)).await;
        assert!(
            start.elapsed() < Duration::from_millis(100),
            "Mock sleep took too long: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn real_provider_actually_sleeps() {
        let provider = RealTimeProvider::new();
        let start = Instant::now();
        provider.sleep(Duration::from_millis(50)).await;
        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "Real sleep was too short: {:?}",
            start.elapsed()
        );
    }
}
