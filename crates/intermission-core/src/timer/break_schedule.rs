//! Break schedule orchestrator.
//!
//! Owns one [`WorkCycle`] per schedule slot, follows the current one through
//! a phase subscription, advances when it finishes, and keeps the running
//! counters. Counters are always updated before the next cycle starts, and a
//! [`ScheduleStatus`] is published after every change.
//!
//! Lock order is schedule state, then cycle state. Cycles never call back
//! into the schedule; their phases arrive through a forwarding task.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cycle::WorkCycle;
use super::phase::Phase;
use super::schedule::Schedule;
use crate::clock::Clock;
use crate::error::ValidationError;
use crate::events::{Counters, ScheduleStatus};
use crate::inactivity::InactivityListener;
use crate::lock;
use crate::power::{PowerCallback, PowerEvent, SleepWakeProvider};

const STATUS_CAPACITY: usize = 256;

/// Where [`BreakSchedule::restart_schedule`] restarts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPoint {
    /// Back to slot 0 with every counter zeroed.
    AppStart,
    /// Back to slot 0, counters kept.
    ScheduleStart,
    /// Restart the current slot's work phase.
    CycleStart,
}

#[derive(Debug, Clone, Copy)]
enum Advance {
    Completed,
    Skipped,
}

struct PowerBinding {
    provider: Arc<dyn SleepWakeProvider>,
    task: CancellationToken,
}

struct State {
    schedule: Schedule,
    cycles: Vec<WorkCycle>,
    current: usize,
    counters: Counters,
    /// Bumped on every resubscription; phases from older ones are dropped.
    generation: u64,
    forwarder: Option<CancellationToken>,
    status: ScheduleStatus,
    slept_at: Option<DateTime<Local>>,
}

impl State {
    fn current_cycle(&self) -> Option<&WorkCycle> {
        self.cycles.get(self.current)
    }

    fn has_cycles(&self, op: &str) -> bool {
        if self.cycles.is_empty() {
            warn!(op, "no cycles configured, ignoring");
            false
        } else {
            true
        }
    }

    fn drop_subscription(&mut self) {
        if let Some(token) = self.forwarder.take() {
            token.cancel();
        }
    }
}

struct Inner {
    state: Mutex<State>,
    status_tx: broadcast::Sender<ScheduleStatus>,
    clock: Arc<dyn Clock>,
    inactivity: Arc<InactivityListener>,
    runtime: Handle,
    power: Mutex<Option<PowerBinding>>,
}

impl Inner {
    fn build_cycles(&self, schedule: &Schedule) -> Vec<WorkCycle> {
        let _guard = self.runtime.enter();
        schedule
            .cycles
            .iter()
            .map(|config| WorkCycle::new(*config, self.clock.clone(), self.inactivity.clone()))
            .collect()
    }

    fn publish_status(&self, state: &mut State) {
        let (phase, running) = state
            .current_cycle()
            .map_or((Phase::Idle, false), WorkCycle::snapshot);
        self.publish_phase(state, phase, running);
    }

    fn publish_phase(&self, state: &mut State, phase: Phase, running: bool) {
        let status = ScheduleStatus::new(state.current, phase, running, state.counters);
        state.status = status;
        // Having no subscribers is fine.
        let _ = self.status_tx.send(status);
    }

    /// Follow the current cycle's phases, replacing any earlier subscription.
    fn subscribe_current(self: &Arc<Self>, state: &mut State) {
        state.drop_subscription();
        state.generation += 1;
        let Some(cycle) = state.current_cycle() else {
            return;
        };

        let mut phases = cycle.subscribe();
        let generation = state.generation;
        let token = CancellationToken::new();
        let cancel = token.clone();
        let inner = Arc::downgrade(self);
        self.runtime.spawn(async move {
            loop {
                let phase = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    phase = phases.recv() => match phase {
                        Some(phase) => phase,
                        None => break,
                    },
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.on_phase_change(generation, phase);
            }
        });
        state.forwarder = Some(token);
    }

    fn on_phase_change(self: &Arc<Self>, generation: u64, phase: Phase) {
        let mut state = lock(&self.state);
        if generation != state.generation {
            return;
        }
        let Some((current, running)) = state.current_cycle().map(WorkCycle::snapshot) else {
            return;
        };
        if phase == Phase::Finished {
            // The cycle may have been restarted after it published `Finished`.
            if current == Phase::Finished {
                self.advance(&mut state, Advance::Completed);
            }
            return;
        }
        // Publish the phase as delivered: the cycle may already have moved on.
        self.publish_phase(&mut state, phase, running);
    }

    /// Make `index` the current slot: the old cycle is reset for its next
    /// lap and the subscription moves over.
    fn switch_to(self: &Arc<Self>, state: &mut State, index: usize) {
        state.drop_subscription();
        if let Some(old) = state.current_cycle() {
            old.reset();
        }
        state.current = index;
        self.subscribe_current(state);
    }

    fn advance(self: &Arc<Self>, state: &mut State, reason: Advance) {
        if !state.has_cycles("advance") {
            return;
        }
        let from = state.current;
        let to = (from + 1) % state.cycles.len();
        match reason {
            Advance::Completed => state.counters.record_start(),
            Advance::Skipped => state.counters.record_skip(),
        }
        self.switch_to(state, to);
        info!(
            from,
            to,
            ?reason,
            count = state.counters.count,
            skipped = state.counters.skipped,
            "advancing to next cycle"
        );
        state.cycles[to].start_working(None);
        self.publish_status(state);
    }

    fn jump_to_break(self: &Arc<Self>, state: &mut State, index: usize) {
        if index != state.current {
            self.switch_to(state, index);
        }
        info!(cycle = index, "jumping to break");
        state.cycles[index].start_break(None);
        self.publish_status(state);
    }

    fn restart(self: &Arc<Self>, state: &mut State, point: RestartPoint) {
        if !state.has_cycles("restart") {
            return;
        }
        match point {
            RestartPoint::AppStart => {
                self.switch_to(state, 0);
                state.counters = Counters::default();
                state.counters.record_start();
                state.cycles[0].start_working(None);
            }
            RestartPoint::ScheduleStart => {
                self.switch_to(state, 0);
                state.cycles[0].start_working(None);
            }
            RestartPoint::CycleStart => {
                state.cycles[state.current].start_working(None);
            }
        }
        info!(?point, count = state.counters.count, "schedule restarted");
        self.publish_status(state);
    }

    fn handle_power_event(self: &Arc<Self>, event: PowerEvent, at: DateTime<Local>) {
        let mut state = lock(&self.state);
        match event {
            PowerEvent::Sleeping => {
                if let Some(cycle) = state.current_cycle() {
                    cycle.pause();
                }
                state.slept_at = Some(at);
                info!(%at, "system going to sleep, schedule paused");
                self.publish_status(&mut state);
            }
            PowerEvent::Awake => {
                let slept_at = state.slept_at.take();
                if state.counters.count == 0 {
                    debug!("woke before the schedule was started");
                    return;
                }
                // Never drop the user back into the middle of a break.
                let point = match slept_at {
                    Some(slept) if slept.date_naive() != at.date_naive() => RestartPoint::AppStart,
                    _ => RestartPoint::ScheduleStart,
                };
                info!(%at, ?point, "system awake");
                self.restart(&mut state, point);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drop_subscription();
        if let Some(binding) = self
            .power
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            binding.task.cancel();
            binding.provider.stop_listening();
        }
    }
}

/// Orchestrates the cycles of a schedule. Cloning shares the same engine.
#[derive(Clone)]
pub struct BreakSchedule {
    inner: Arc<Inner>,
}

impl BreakSchedule {
    /// Build an idle engine for `schedule`. Nothing runs until [`start`](Self::start).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        schedule: Schedule,
        clock: Arc<dyn Clock>,
        inactivity: Arc<InactivityListener>,
    ) -> Self {
        let schedule = match schedule.validate() {
            Ok(()) => schedule,
            Err(e) => {
                warn!(error = %e, "ignoring invalid schedule, engine has no cycles");
                Schedule { cycles: Vec::new() }
            }
        };
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                schedule: Schedule { cycles: Vec::new() },
                cycles: Vec::new(),
                current: 0,
                counters: Counters::default(),
                generation: 0,
                forwarder: None,
                status: ScheduleStatus::default(),
                slept_at: None,
            }),
            status_tx,
            clock,
            inactivity,
            runtime: Handle::current(),
            power: Mutex::new(None),
        });
        {
            let mut state = lock(&inner.state);
            state.cycles = inner.build_cycles(&schedule);
            state.schedule = schedule;
            inner.subscribe_current(&mut state);
            inner.publish_status(&mut state);
        }
        Self { inner }
    }

    pub fn status(&self) -> ScheduleStatus {
        lock(&self.inner.state).status
    }

    /// Every status published from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn schedule(&self) -> Schedule {
        lock(&self.inner.state).schedule.clone()
    }

    pub fn counters(&self) -> Counters {
        lock(&self.inner.state).counters
    }

    pub fn current_index(&self) -> usize {
        lock(&self.inner.state).current
    }

    pub fn current_phase(&self) -> Phase {
        lock(&self.inner.state)
            .current_cycle()
            .map_or(Phase::Idle, WorkCycle::phase)
    }

    /// Start the first cycle. Only effective before anything was started.
    pub fn start(&self) {
        let mut state = lock(&self.inner.state);
        if state.counters.count != 0 {
            debug!("schedule already started");
            return;
        }
        if !state.has_cycles("start") {
            return;
        }
        state.counters.record_start();
        info!(cycle = state.current, "schedule started");
        state.cycles[state.current].start_working(None);
        self.inner.publish_status(&mut state);
    }

    pub fn pause(&self) {
        self.with_current("pause", WorkCycle::pause);
    }

    pub fn resume(&self) {
        self.with_current("resume", WorkCycle::resume);
    }

    pub fn toggle_paused(&self) {
        self.with_current("toggle_paused", |cycle| {
            let (phase, running) = cycle.snapshot();
            if phase.is_active() && !running {
                cycle.resume();
            } else {
                cycle.pause();
            }
        });
    }

    /// Break now on the current slot, optionally for a custom length.
    pub fn start_break(&self, override_length: Option<Duration>) {
        self.with_current("start_break", |cycle| cycle.start_break(override_length));
    }

    /// Postpone the break: work again for `duration` on the same slot.
    pub fn delay(&self, duration: Duration) {
        let mut state = lock(&self.inner.state);
        if !state.has_cycles("delay") {
            return;
        }
        if state.counters.count == 0 {
            debug!("delay before the schedule was started, ignoring");
            return;
        }
        state.counters.record_delay();
        info!(
            secs = duration.as_secs(),
            delayed = state.counters.delayed,
            "break delayed"
        );
        state.cycles[state.current].start_working(Some(duration));
        self.inner.publish_status(&mut state);
    }

    /// Abandon the current cycle and start working on the next slot.
    pub fn skip(&self) {
        let mut state = lock(&self.inner.state);
        self.inner.advance(&mut state, Advance::Skipped);
    }

    /// Jump straight into the break of slot `index`. Counters are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfBounds`] for an index past the schedule.
    pub fn start_break_at(&self, index: usize) -> Result<(), ValidationError> {
        let mut state = lock(&self.inner.state);
        let len = state.cycles.len();
        if index >= len {
            warn!(index, len, "break slot out of range");
            return Err(ValidationError::OutOfBounds {
                collection: "schedule".into(),
                index,
                len,
            });
        }
        self.inner.jump_to_break(&mut state, index);
        Ok(())
    }

    /// Jump to the nearest slot (searching forward, current slot included)
    /// that has the schedule's longest break. Counters are untouched.
    pub fn start_long_break(&self) {
        let mut state = lock(&self.inner.state);
        let Some(target) = state.schedule.nearest_longest_break(state.current) else {
            warn!(op = "start_long_break", "no cycles configured, ignoring");
            return;
        };
        let already_there = target == state.current
            && state.cycles[target].phase().is_breaking();
        if already_there {
            debug!(cycle = target, "already in the longest break");
            return;
        }
        self.inner.jump_to_break(&mut state, target);
    }

    pub fn restart_schedule(&self, from: RestartPoint) {
        let mut state = lock(&self.inner.state);
        self.inner.restart(&mut state, from);
    }

    /// Replace the schedule. Counters are reset; a running engine restarts on
    /// the first slot, an engine that was never started stays idle.
    /// Invalid schedules are logged and ignored.
    pub fn set_schedule(&self, schedule: Schedule) {
        if let Err(e) = schedule.validate() {
            warn!(error = %e, "ignoring invalid schedule");
            return;
        }
        let cycles = self.inner.build_cycles(&schedule);
        let mut state = lock(&self.inner.state);
        state.drop_subscription();
        if let Some(cycle) = state.current_cycle() {
            cycle.cancel();
        }
        let was_started = state.counters.count > 0;
        state.cycles = cycles;
        state.schedule = schedule;
        state.current = 0;
        state.counters = Counters::default();
        self.inner.subscribe_current(&mut state);
        if was_started {
            state.counters.record_start();
            state.cycles[0].start_working(None);
        }
        info!(cycles = state.cycles.len(), restarted = was_started, "schedule replaced");
        self.inner.publish_status(&mut state);
    }

    /// Stop the current timer without publishing anything.
    pub fn cancel_timer(&self) {
        if let Some(cycle) = lock(&self.inner.state).current_cycle() {
            cycle.cancel();
        }
    }

    /// React to the machine sleeping or waking at local time `at`.
    ///
    /// Sleep pauses the current cycle. Waking on the same calendar day
    /// restarts from the first slot; waking on a later day also resets the
    /// counters.
    pub fn handle_power_event(&self, event: PowerEvent, at: DateTime<Local>) {
        self.inner.handle_power_event(event, at);
    }

    /// Listen to `provider` for sleep/wake notifications, replacing any
    /// earlier provider. A provider that cannot listen is logged and ignored.
    pub fn attach_sleep_wake(&self, provider: Arc<dyn SleepWakeProvider>) {
        self.detach_sleep_wake();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback: PowerCallback = Arc::new(move |event: PowerEvent| {
            let _ = tx.send((event, Local::now()));
        });
        if let Err(e) = provider.start_listening(callback) {
            warn!(error = %e, "sleep/wake notifications unavailable, continuing without them");
            return;
        }

        let token = CancellationToken::new();
        let cancel = token.clone();
        let inner = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            loop {
                let (event, at) = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(next) => next,
                        None => break,
                    },
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_power_event(event, at);
            }
        });
        *lock(&self.inner.power) = Some(PowerBinding {
            provider,
            task: token,
        });
    }

    pub fn detach_sleep_wake(&self) {
        let binding = lock(&self.inner.power).take();
        if let Some(binding) = binding {
            binding.task.cancel();
            binding.provider.stop_listening();
        }
    }

    /// Tear down: stop the current timer, drop the phase subscription and
    /// release every AV and sleep/wake listener.
    pub fn shutdown(&self) {
        self.detach_sleep_wake();
        {
            let mut state = lock(&self.inner.state);
            state.drop_subscription();
            if let Some(cycle) = state.current_cycle() {
                cycle.cancel();
            }
        }
        self.inner.inactivity.gate().stop_listening();
        info!("break schedule shut down");
    }

    fn with_current(&self, op: &str, f: impl FnOnce(&WorkCycle)) {
        let mut state = lock(&self.inner.state);
        let Some(cycle) = state.current_cycle() else {
            warn!(op, "no cycles configured, ignoring");
            return;
        };
        f(cycle);
        self.inner.publish_status(&mut state);
    }
}
