//! Clock capability.
//!
//! Every suspension in the engine goes through [`Clock`] so the timing
//! source can be swapped. [`TokioClock`] is backed by `tokio::time`, which
//! means a runtime built with a paused clock (`#[tokio::test(start_paused = true)]`)
//! gives fully deterministic virtual time without any extra fake.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Length of one countdown tick.
pub const TICK: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant on this clock.
    fn now(&self) -> Instant;

    /// Suspend for at least `duration`.
    async fn sleep(&self, duration: Duration);

    /// Suspend until `deadline`. `tolerance` lets an implementation coalesce
    /// the wakeup up to that much later.
    async fn sleep_until(&self, deadline: Instant, tolerance: Option<Duration>);
}

/// Production clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, deadline: Instant, _tolerance: Option<Duration>) {
        // tokio already rounds timers to its millisecond wheel; no extra slack.
        tokio::time::sleep_until(deadline).await;
    }
}
