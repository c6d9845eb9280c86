//! Sleep/wake capability.
//!
//! The OS binding is supplied by the host; the engine only needs to hear
//! about the machine going to sleep and waking up again.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerEvent {
    Sleeping,
    Awake,
}

pub type PowerCallback = Arc<dyn Fn(PowerEvent) + Send + Sync>;

pub trait SleepWakeProvider: Send + Sync {
    fn start_listening(&self, callback: PowerCallback) -> Result<(), DeviceError>;

    fn stop_listening(&self);
}

/// In-process [`SleepWakeProvider`] driven by [`ManualSleepWake::emit`].
#[derive(Default)]
pub struct ManualSleepWake {
    callback: Mutex<Option<PowerCallback>>,
}

impl ManualSleepWake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to the registered listener. Returns `false` when
    /// nobody is listening.
    pub fn emit(&self, event: PowerEvent) -> bool {
        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        lock(&self.callback).is_some()
    }
}

impl SleepWakeProvider for ManualSleepWake {
    fn start_listening(&self, callback: PowerCallback) -> Result<(), DeviceError> {
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    fn stop_listening(&self) {
        *lock(&self.callback) = None;
    }
}
