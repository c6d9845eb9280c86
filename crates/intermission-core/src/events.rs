use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Running counters of a break schedule.
///
/// `delayed` only ever returns to zero together with `count` moving forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub skipped: u64,
    pub delayed: u64,
    /// Cycles started.
    pub count: u64,
}

impl Counters {
    /// Cycles that ran to the end of their break. The current cycle is not
    /// counted until it is over.
    pub fn completed(&self) -> u64 {
        self.count.saturating_sub(1).saturating_sub(self.skipped)
    }

    pub fn record_start(&mut self) {
        self.count += 1;
        self.delayed = 0;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
        self.record_start();
    }

    pub fn record_delay(&mut self) {
        self.delayed += 1;
    }
}

/// Read-only projection published on every change of the schedule or of its
/// current cycle. Successive snapshots may be identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub cycle_index: usize,
    pub phase: Phase,
    pub is_blocking: bool,
    pub is_paused: bool,
    pub remaining_secs: u64,
    pub phase_length_secs: u64,
    pub skipped: u64,
    pub delayed: u64,
    pub count: u64,
    pub completed: u64,
}

impl ScheduleStatus {
    pub fn new(cycle_index: usize, phase: Phase, running: bool, counters: Counters) -> Self {
        Self {
            cycle_index,
            phase,
            is_blocking: phase.is_breaking(),
            is_paused: phase.is_active() && !running,
            remaining_secs: phase.remaining_secs(),
            phase_length_secs: phase.length_secs(),
            skipped: counters.skipped,
            delayed: counters.delayed,
            count: counters.count,
            completed: counters.completed(),
        }
    }
}
