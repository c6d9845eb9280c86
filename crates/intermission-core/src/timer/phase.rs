use serde::{Deserialize, Serialize};

/// Lifecycle stage of a single work cycle.
///
/// Within one run the order is `Idle -> Working -> Waiting -> Breaking -> Finished`.
/// Pausing freezes the `remaining` value in place; `reset` forces `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    /// Counting down the work interval. `length` is the effective duration
    /// of this run (including any override), both in seconds.
    Working { remaining: u64, length: u64 },
    /// Work is over; waiting until the user is idle and off any call.
    Waiting,
    Breaking { remaining: u64, length: u64 },
    Finished,
}

impl Phase {
    pub fn remaining_secs(&self) -> u64 {
        match self {
            Phase::Working { remaining, .. } | Phase::Breaking { remaining, .. } => *remaining,
            _ => 0,
        }
    }

    pub fn length_secs(&self) -> u64 {
        match self {
            Phase::Working { length, .. } | Phase::Breaking { length, .. } => *length,
            _ => 0,
        }
    }

    pub fn is_breaking(&self) -> bool {
        matches!(self, Phase::Breaking { .. })
    }

    /// Phases a timer can be paused in and resumed from.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::Working { .. } | Phase::Waiting | Phase::Breaking { .. }
        )
    }
}
