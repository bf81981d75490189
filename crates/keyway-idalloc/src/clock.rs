use async_trait::async_trait;
use jiff::Timestamp;
use std::time::Duration;

/// Time source of the flake allocator.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;

    /// Resolves once the clock reads `target` or later. Must not block the
    /// calling thread.
    async fn sleep_until(&self, target: Timestamp);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    async fn sleep_until(&self, target: Timestamp) {
        // The wall clock can lag the timer, so check again after each sleep.
        loop {
            let now = Timestamp::now();
            if now >= target {
                return;
            }
            let remaining = Duration::try_from(target.duration_since(now)).unwrap_or_default();
            tokio::time::sleep(remaining.max(Duration::from_millis(1))).await;
        }
    }
}
