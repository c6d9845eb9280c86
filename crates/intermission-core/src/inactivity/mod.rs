//! Inactivity gating: user activity thresholds plus camera/microphone presence.

mod av;
mod listener;
mod threshold;

pub use av::{
    AvPresenceGate, AvState, AvStateStream, DeviceCallback, DeviceInfo, DeviceKind,
    DeviceProvider, ManualDeviceProvider,
};
pub use listener::InactivityListener;
pub use threshold::{ActivityMonitor, ActivityThreshold, ActivityTracker, Sampler};
