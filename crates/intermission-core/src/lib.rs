//! # Intermission Core Library
//!
//! Work/break scheduling with inactivity gating. A break only starts once the
//! user has gone quiet and no camera or microphone is in use, so calls and
//! typing bursts are never interrupted.
//!
//! ## Architecture
//!
//! - **Work cycle**: one work interval, a wait for inactivity, one break.
//!   Runs on a cancellable Tokio task and publishes every phase.
//! - **Break schedule**: walks a list of cycles, keeps skip/delay counters,
//!   and publishes a [`ScheduleStatus`] on every change.
//! - **Inactivity**: activity thresholds and the AV presence gate, combined
//!   by the [`InactivityListener`].
//! - **Storage**: TOML configuration.
//!
//! Time comes from an injected [`Clock`]; under `tokio::time::pause` the
//! whole engine runs on virtual time.

pub mod clock;
pub mod error;
pub mod events;
pub mod inactivity;
pub mod power;
pub mod storage;
pub mod timer;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::{Clock, TokioClock};
pub use error::{ConfigError, CoreError, DeviceError, ValidationError};
pub use events::{Counters, ScheduleStatus};
pub use inactivity::{
    ActivityMonitor, ActivityThreshold, ActivityTracker, AvPresenceGate, DeviceProvider,
    InactivityListener, ManualDeviceProvider,
};
pub use power::{ManualSleepWake, PowerEvent, SleepWakeProvider};
pub use storage::Config;
pub use timer::{BreakSchedule, CycleConfig, Phase, RestartPoint, Schedule, WorkCycle};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
