//! Activity threshold monitor.
//!
//! Each [`ActivityThreshold`] answers "how long since the last event of this
//! kind?" on demand. The monitor resolves once every indicator has been quiet
//! for at least its own threshold at the same instant. Instead of polling on a
//! fixed interval it sleeps exactly as long as the slowest unsatisfied
//! indicator still needs, then samples again.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::lock;

/// Returns the time elapsed since the last event of one kind.
pub type Sampler = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Stateless descriptor of one activity indicator.
#[derive(Clone)]
pub struct ActivityThreshold {
    pub name: String,
    pub threshold: Duration,
    sampler: Sampler,
}

impl ActivityThreshold {
    pub fn new<F>(name: impl Into<String>, threshold: Duration, sampler: F) -> Self
    where
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            threshold,
            sampler: Arc::new(sampler),
        }
    }

    pub fn from_sampler(name: impl Into<String>, threshold: Duration, sampler: Sampler) -> Self {
        Self {
            name: name.into(),
            threshold,
            sampler,
        }
    }

    pub fn sample(&self) -> Duration {
        (self.sampler)()
    }

    /// Time still needed before this indicator counts as inactive.
    fn remaining(&self) -> Option<Duration> {
        let elapsed = self.sample();
        if elapsed >= self.threshold {
            None
        } else {
            Some(self.threshold - elapsed)
        }
    }
}

impl fmt::Debug for ActivityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityThreshold")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

pub struct ActivityMonitor {
    thresholds: Vec<ActivityThreshold>,
    clock: Arc<dyn Clock>,
}

impl ActivityMonitor {
    pub fn new(thresholds: Vec<ActivityThreshold>, clock: Arc<dyn Clock>) -> Self {
        Self { thresholds, clock }
    }

    pub fn thresholds(&self) -> &[ActivityThreshold] {
        &self.thresholds
    }

    /// Sample every indicator once. `None` means all are inactive right now;
    /// otherwise the longest remaining wait among the unsatisfied ones.
    pub fn time_until_inactive(&self) -> Option<Duration> {
        self.thresholds.iter().filter_map(ActivityThreshold::remaining).max()
    }

    /// Resolve once all indicators are simultaneously inactive.
    ///
    /// An empty threshold list counts as already inactive.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] when `cancel` fires.
    pub async fn wait_until_inactive(&self, cancel: &CancellationToken) -> Result<()> {
        if self.thresholds.is_empty() {
            warn!("no activity thresholds configured, treating user as inactive");
            return Ok(());
        }

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let Some(wait) = self.time_until_inactive() else {
                return Ok(());
            };
            debug!(wait_secs = wait.as_secs_f64(), "user active, sleeping until thresholds could pass");
            tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = self.clock.sleep(wait) => {}
            }
        }
    }
}

/// Last-event record the host updates from its input hooks.
///
/// Cloning shares the same record; [`ActivityTracker::sampler`] turns it
/// into a sampler for an [`ActivityThreshold`].
#[derive(Clone)]
pub struct ActivityTracker {
    last_event: Arc<Mutex<Instant>>,
    clock: Arc<dyn Clock>,
}

impl ActivityTracker {
    /// A fresh tracker counts "now" as the last event.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            last_event: Arc::new(Mutex::new(now)),
            clock,
        }
    }

    pub fn record(&self) {
        *lock(&self.last_event) = self.clock.now();
    }

    pub fn elapsed(&self) -> Duration {
        let last = *lock(&self.last_event);
        self.clock.now().saturating_duration_since(last)
    }

    pub fn sampler(&self) -> Sampler {
        let tracker = self.clone();
        Arc::new(move || tracker.elapsed())
    }

    pub fn threshold(&self, name: impl Into<String>, threshold: Duration) -> ActivityThreshold {
        ActivityThreshold::from_sampler(name, threshold, self.sampler())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(TokioClock)
    }

    #[tokio::test(start_paused = true)]
    async fn already_inactive_resolves_immediately() {
        let monitor = ActivityMonitor::new(
            vec![ActivityThreshold::new("keyboard", Duration::from_secs(5), || {
                Duration::from_secs(60)
            })],
            clock(),
        );
        let start = Instant::now();
        monitor.wait_until_inactive(&CancellationToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_thresholds_resolve_immediately() {
        let monitor = ActivityMonitor::new(vec![], clock());
        assert!(monitor.wait_until_inactive(&CancellationToken::new()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_slowest_indicator() {
        let clock = clock();
        let keyboard = ActivityTracker::new(clock.clone());
        let mouse = ActivityTracker::new(clock.clone());
        let monitor = ActivityMonitor::new(
            vec![
                keyboard.threshold("keyboard", Duration::from_secs(10)),
                mouse.threshold("mouse", Duration::from_secs(4)),
            ],
            clock,
        );
        let start = Instant::now();
        monitor.wait_until_inactive(&CancellationToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_during_the_sleep_extends_the_wait() {
        let clock = clock();
        let keyboard = ActivityTracker::new(clock.clone());
        let monitor = ActivityMonitor::new(
            vec![keyboard.threshold("keyboard", Duration::from_secs(10))],
            clock,
        );

        let typist = keyboard.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            typist.record();
        });

        let start = Instant::now();
        monitor.wait_until_inactive(&CancellationToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_sleep() {
        let clock = clock();
        let keyboard = ActivityTracker::new(clock.clone());
        let monitor = ActivityMonitor::new(
            vec![keyboard.threshold("keyboard", Duration::from_secs(300))],
            clock,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = monitor.wait_until_inactive(&cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[test]
    fn time_until_inactive_reports_the_maximum_gap() {
        let monitor = ActivityMonitor::new(
            vec![
                ActivityThreshold::new("a", Duration::from_secs(10), || Duration::from_secs(3)),
                ActivityThreshold::new("b", Duration::from_secs(4), || Duration::from_secs(1)),
                ActivityThreshold::new("c", Duration::from_secs(2), || Duration::from_secs(9)),
            ],
            Arc::new(TokioClock),
        );
        assert_eq!(monitor.time_until_inactive(), Some(Duration::from_secs(7)));
    }
}
