//! Work cycle state machine.
//!
//! A cycle owns at most one timer task. Every operation that starts a phase
//! cancels the previous task before spawning the next one, under the same
//! lock that guards the phase, so two countdowns of one cycle never overlap
//! and a cancelled task can never publish after its replacement started.
//!
//! ```text
//! Idle -> Working(n..0) -> Waiting -> Breaking(m..0) -> Finished
//! ```
//!
//! Each countdown publishes its starting value synchronously, then one value
//! per tick, and holds `0` for one tick before moving on.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::phase::Phase;
use super::schedule::CycleConfig;
use crate::clock::{Clock, TICK};
use crate::error::{CoreError, Result};
use crate::inactivity::InactivityListener;
use crate::lock;

struct TimerSlot {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CycleState {
    phase: Phase,
    subscribers: Vec<mpsc::UnboundedSender<Phase>>,
    timer: Option<TimerSlot>,
    next_timer_id: u64,
}

impl CycleState {
    fn publish(&mut self, phase: Phase) {
        self.phase = phase;
        self.subscribers.retain(|tx| tx.send(phase).is_ok());
    }

    fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Work { from: u64, length: u64 },
    Break { from: u64, length: u64 },
}

impl Plan {
    fn first_phase(self) -> Phase {
        match self {
            Plan::Work { from, length } => Phase::Working {
                remaining: from,
                length,
            },
            Plan::Break { from, length } => Phase::Breaking {
                remaining: from,
                length,
            },
        }
    }
}

pub struct WorkCycle {
    config: CycleConfig,
    clock: Arc<dyn Clock>,
    inactivity: Arc<InactivityListener>,
    runtime: Handle,
    state: Arc<Mutex<CycleState>>,
}

impl WorkCycle {
    /// Create an idle cycle.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; the runtime is captured so
    /// later operations may be invoked from any thread.
    pub fn new(
        config: CycleConfig,
        clock: Arc<dyn Clock>,
        inactivity: Arc<InactivityListener>,
    ) -> Self {
        Self {
            config,
            clock,
            inactivity,
            runtime: Handle::current(),
            state: Arc::new(Mutex::new(CycleState::default())),
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    /// Whether a timer task currently owns this cycle.
    pub fn is_running(&self) -> bool {
        lock(&self.state).timer.is_some()
    }

    /// Phase and running flag read under one lock.
    pub fn snapshot(&self) -> (Phase, bool) {
        let state = lock(&self.state);
        (state.phase, state.timer.is_some())
    }

    /// Receive every phase this cycle publishes from now on, in order.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Phase> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).subscribers.push(tx);
        rx
    }

    /// Count down the work interval (or `override_length`), wait for
    /// inactivity, then count down the break.
    pub fn start_working(&self, override_length: Option<Duration>) {
        let length = override_length.map_or(self.config.work_length_secs, |d| d.as_secs());
        let mut state = lock(&self.state);
        self.start_locked(&mut state, Plan::Work { from: length, length });
    }

    /// Go straight to the break, skipping work and the inactivity gate.
    pub fn start_break(&self, override_length: Option<Duration>) {
        let length = override_length.map_or(self.config.break_length_secs, |d| d.as_secs());
        let mut state = lock(&self.state);
        self.start_locked(&mut state, Plan::Break { from: length, length });
    }

    /// Stop the timer, keeping the phase (and its remaining time) as is.
    pub fn pause(&self) {
        if lock(&self.state).cancel_timer() {
            debug!("cycle paused");
        }
    }

    /// Continue from the stored phase. A paused `Waiting` goes straight to
    /// the break: resuming is an explicit request, so the inactivity gate is
    /// skipped.
    pub fn resume(&self) {
        let mut state = lock(&self.state);
        if state.timer.is_some() {
            return;
        }
        let plan = match state.phase {
            Phase::Working { remaining, length } => Plan::Work {
                from: remaining,
                length,
            },
            Phase::Waiting => Plan::Break {
                from: self.config.break_length_secs,
                length: self.config.break_length_secs,
            },
            Phase::Breaking { remaining, length } => Plan::Break {
                from: remaining,
                length,
            },
            Phase::Idle | Phase::Finished => return,
        };
        debug!(?plan, "cycle resumed");
        self.start_locked(&mut state, plan);
    }

    /// Stop the timer and return to `Idle`.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.cancel_timer();
        state.publish(Phase::Idle);
    }

    /// Stop the timer without touching the phase. Used on shutdown.
    pub fn cancel(&self) {
        lock(&self.state).cancel_timer();
    }

    fn start_locked(&self, state: &mut CycleState, plan: Plan) {
        state.cancel_timer();
        state.publish(plan.first_phase());

        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let cancel = CancellationToken::new();
        let runner = PhaseRunner {
            state: self.state.clone(),
            cancel: cancel.clone(),
            clock: self.clock.clone(),
            inactivity: self.inactivity.clone(),
            break_length: self.config.break_length_secs,
        };
        let shared = self.state.clone();
        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(runner.run(plan)).catch_unwind().await;
            let result = outcome.unwrap_or_else(|panic| {
                Err(CoreError::TaskPanicked(panic_message(panic.as_ref())))
            });
            finish(&shared, id, result);
        });
        state.timer = Some(TimerSlot { id, cancel });
    }
}

impl Drop for WorkCycle {
    fn drop(&mut self) {
        lock(&self.state).cancel_timer();
    }
}

/// Clear the slot if it still belongs to task `id`; failures force `Idle`.
fn finish(state: &Mutex<CycleState>, id: u64, result: Result<()>) {
    let mut state = lock(state);
    let owned = state.timer.as_ref().is_some_and(|slot| slot.id == id);
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!(timer = id, "phase task cancelled"),
        Err(e) => {
            if owned {
                error!(timer = id, error = %e, "phase task failed, cycle reset to idle");
                state.publish(Phase::Idle);
            }
        }
    }
    if owned {
        state.timer = None;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

struct PhaseRunner {
    state: Arc<Mutex<CycleState>>,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
    inactivity: Arc<InactivityListener>,
    break_length: u64,
}

impl PhaseRunner {
    async fn run(self, plan: Plan) -> Result<()> {
        match plan {
            Plan::Work { from, length } => {
                self.count_down(from, |remaining| Phase::Working { remaining, length })
                    .await?;
                self.publish(Phase::Waiting)?;
                debug!("work finished, waiting for inactivity");
                self.inactivity.wait_for_inactivity(&self.cancel).await?;

                let length = self.break_length;
                self.publish(Phase::Breaking {
                    remaining: length,
                    length,
                })?;
                self.count_down(length, |remaining| Phase::Breaking { remaining, length })
                    .await?;
            }
            Plan::Break { from, length } => {
                self.count_down(from, |remaining| Phase::Breaking { remaining, length })
                    .await?;
            }
        }
        self.publish(Phase::Finished)?;
        debug!("cycle finished");
        Ok(())
    }

    /// `from` has already been published by the caller.
    async fn count_down(&self, from: u64, phase: impl Fn(u64) -> Phase) -> Result<()> {
        for remaining in (0..from).rev() {
            self.tick().await?;
            self.publish(phase(remaining))?;
        }
        self.tick().await
    }

    async fn tick(&self) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CoreError::Cancelled),
            _ = self.clock.sleep(TICK) => Ok(()),
        }
    }

    fn publish(&self, phase: Phase) -> Result<()> {
        let mut state = lock(&self.state);
        // Checked under the lock: once a canceller has released it, we are done.
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        state.publish(phase);
        Ok(())
    }
}
