use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::av::AvPresenceGate;
use super::threshold::ActivityMonitor;
use crate::error::{CoreError, Result};

/// Decides when it is safe to interrupt the user with a break: nobody is on
/// a call (no camera or microphone in use) and every activity indicator has
/// been quiet for its threshold.
pub struct InactivityListener {
    monitor: ActivityMonitor,
    gate: AvPresenceGate,
}

impl InactivityListener {
    pub fn new(monitor: ActivityMonitor, gate: AvPresenceGate) -> Self {
        Self { monitor, gate }
    }

    pub fn monitor(&self) -> &ActivityMonitor {
        &self.monitor
    }

    pub fn gate(&self) -> &AvPresenceGate {
        &self.gate
    }

    /// Wait until it is safe to start a break. Unbounded: returns only once
    /// the user is inactive and no AV device is running, or on cancellation.
    ///
    /// The AV listener registrations are owned by this call and released on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] when `cancel` fires.
    pub async fn wait_for_inactivity(&self, cancel: &CancellationToken) -> Result<()> {
        let mut av = self.gate.listen();

        loop {
            let state = tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                state = av.next() => state,
            };

            if state.any_active() {
                // No point sampling user activity during a call.
                debug!(
                    camera = state.camera_active,
                    microphone = state.microphone_active,
                    "AV device in use, deferring break"
                );
                continue;
            }

            self.monitor.wait_until_inactive(cancel).await?;

            // A device may have switched on while we waited for the user.
            let after = av.drain();
            if !after.any_active() {
                info!("user inactive and no AV device in use");
                return Ok(());
            }
            debug!("AV device came on while waiting for user inactivity");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::clock::{Clock, TokioClock};
    use crate::inactivity::av::ManualDeviceProvider;
    use crate::inactivity::threshold::{ActivityThreshold, ActivityTracker};

    struct Fixture {
        camera: Arc<ManualDeviceProvider>,
        mic: Arc<ManualDeviceProvider>,
        listener: Arc<InactivityListener>,
    }

    fn fixture(camera_on: bool, thresholds: Vec<ActivityThreshold>) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let camera = Arc::new(ManualDeviceProvider::new().with_device("cam", camera_on));
        let mic = Arc::new(ManualDeviceProvider::new().with_device("mic", false));
        let listener = Arc::new(InactivityListener::new(
            ActivityMonitor::new(thresholds, clock),
            AvPresenceGate::new(camera.clone(), mic.clone()),
        ));
        Fixture {
            camera,
            mic,
            listener,
        }
    }

    /// Sampler reporting `already` seconds of inactivity at t=0.
    fn idle_since(already: Duration) -> impl Fn() -> Duration + Send + Sync + 'static {
        let start = Instant::now();
        move || already + start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn idle_user_and_no_devices_resolves_immediately() {
        let f = fixture(false, vec![ActivityThreshold::new(
            "keyboard",
            Duration::from_secs(10),
            || Duration::from_secs(60),
        )]);
        let start = Instant::now();
        f.listener
            .wait_for_inactivity(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(f.camera.listener_count() + f.mic.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_blocks_until_off_then_threshold_still_applies() {
        let f = fixture(true, vec![ActivityThreshold::new(
            "keyboard",
            Duration::from_secs(10),
            idle_since(Duration::from_secs(5)),
        )]);

        let camera = f.camera.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            camera.set_running("cam", false).unwrap();
        });

        let start = Instant::now();
        f.listener
            .wait_for_inactivity(&CancellationToken::new())
            .await
            .unwrap();
        // Camera off at t=2, but the user needs 10s total: 5s before + 5s after t=0.
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn long_call_resolves_as_soon_as_the_camera_turns_off() {
        let f = fixture(true, vec![ActivityThreshold::new(
            "keyboard",
            Duration::from_secs(10),
            idle_since(Duration::from_secs(5)),
        )]);

        let camera = f.camera.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            camera.set_running("cam", false).unwrap();
        });

        let start = Instant::now();
        f.listener
            .wait_for_inactivity(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn device_turning_on_during_the_user_wait_defers_again() {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let keyboard = ActivityTracker::new(clock.clone());
        let f = fixture(false, vec![keyboard.threshold("keyboard", Duration::from_secs(10))]);

        let mic = f.mic.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            mic.set_running("mic", true).unwrap();
            tokio::time::sleep(Duration::from_secs(20)).await;
            mic.set_running("mic", false).unwrap();
        });

        let start = Instant::now();
        f.listener
            .wait_for_inactivity(&CancellationToken::new())
            .await
            .unwrap();
        // Threshold passes at t=10 with the mic on; the mic goes off at t=24.
        assert_eq!(start.elapsed(), Duration::from_secs(24));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_registrations() {
        let f = fixture(true, vec![]);
        let cancel = CancellationToken::new();

        let listener = f.listener.clone();
        let token = cancel.clone();
        let wait = tokio::spawn(async move { listener.wait_for_inactivity(&token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.camera.listener_count(), 1);
        assert_eq!(f.mic.listener_count(), 1);

        cancel.cancel();
        let result = wait.await.unwrap();
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(f.camera.listener_count(), 0);
        assert_eq!(f.mic.listener_count(), 0);
    }
}
