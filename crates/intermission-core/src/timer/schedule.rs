use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One work interval followed by one break interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Work length in seconds.
    pub work_length_secs: u64,
    /// Break length in seconds.
    pub break_length_secs: u64,
}

impl CycleConfig {
    pub fn new(work_length_secs: u64, break_length_secs: u64) -> Self {
        Self {
            work_length_secs,
            break_length_secs,
        }
    }

    /// Convenience constructor from whole minutes.
    ///
    /// Uses saturating arithmetic so absurd inputs clamp instead of wrapping.
    pub fn from_minutes(work_min: u64, break_min: u64) -> Self {
        Self::new(work_min.saturating_mul(60), break_min.saturating_mul(60))
    }

    pub fn work_length(&self) -> Duration {
        Duration::from_secs(self.work_length_secs)
    }

    pub fn break_length(&self) -> Duration {
        Duration::from_secs(self.break_length_secs)
    }
}

/// Ordered, non-empty list of cycles the engine walks through and wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub cycles: Vec<CycleConfig>,
}

impl Schedule {
    /// Build a validated schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptySchedule`] for an empty list and
    /// [`ValidationError::ZeroLength`] when any interval is zero.
    pub fn new(cycles: Vec<CycleConfig>) -> Result<Self, ValidationError> {
        let schedule = Self { cycles };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check the invariants a deserialized schedule might violate.
    ///
    /// # Errors
    ///
    /// Same as [`Schedule::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cycles.is_empty() {
            return Err(ValidationError::EmptySchedule);
        }
        for (index, cycle) in self.cycles.iter().enumerate() {
            if cycle.work_length_secs == 0 {
                return Err(ValidationError::ZeroLength {
                    index,
                    field: "work_length_secs",
                });
            }
            if cycle.break_length_secs == 0 {
                return Err(ValidationError::ZeroLength {
                    index,
                    field: "break_length_secs",
                });
            }
        }
        Ok(())
    }

    /// Three 25/5 cycles followed by a 25/15 cycle.
    pub fn classic() -> Self {
        Self {
            cycles: vec![
                CycleConfig::from_minutes(25, 5),
                CycleConfig::from_minutes(25, 5),
                CycleConfig::from_minutes(25, 5),
                CycleConfig::from_minutes(25, 15),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CycleConfig> {
        self.cycles.get(index)
    }

    /// Longest break across the schedule, `None` when empty.
    pub fn longest_break_secs(&self) -> Option<u64> {
        self.cycles.iter().map(|c| c.break_length_secs).max()
    }

    /// Nearest slot at or after `from` (wrapping) whose break equals the
    /// schedule's longest break.
    pub fn nearest_longest_break(&self, from: usize) -> Option<usize> {
        let longest = self.longest_break_secs()?;
        let len = self.cycles.len();
        (0..len)
            .map(|offset| (from + offset) % len)
            .find(|&i| self.cycles[i].break_length_secs == longest)
    }

    /// Total seconds for one lap through the schedule.
    pub fn total_secs(&self) -> u64 {
        self.cycles
            .iter()
            .map(|c| c.work_length_secs.saturating_add(c.break_length_secs))
            .fold(0u64, u64::saturating_add)
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::classic()
    }
}
