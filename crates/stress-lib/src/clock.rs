//! Time source used by the orchestrator's polling loops

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}


#[cfg(test)]
mod tests {
    use super::manual::ManualClock;
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_millis(200)).await;
        clock.sleep(Duration::from_millis(200)).await;

        assert_eq!(clock.now() - before, Duration::from_millis(400));
    }
}
