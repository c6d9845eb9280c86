mod break_schedule;
mod cycle;
mod phase;
mod schedule;

pub use break_schedule::{BreakSchedule, RestartPoint};
pub use cycle::WorkCycle;
pub use phase::Phase;
pub use schedule::{CycleConfig, Schedule};
