//! Camera/microphone presence gate.
//!
//! Device enumeration and hardware listeners live behind [`DeviceProvider`];
//! this module only merges a camera provider and a microphone provider into
//! a single "is any device in use" signal and an edge-triggered stream of
//! combined states.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DeviceError;
use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Camera => f.write_str("camera"),
            DeviceKind::Microphone => f.write_str("microphone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub is_running: bool,
}

/// Invoked with the device's new running state.
pub type DeviceCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Capability contract for one kind of AV device.
pub trait DeviceProvider: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    fn add_listener(&self, id: &str, callback: DeviceCallback) -> Result<(), DeviceError>;

    fn remove_listener(&self, id: &str);

    /// Drop every listener this provider holds.
    fn stop_listening(&self);
}

/// Latest known state of both device kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvState {
    pub camera_active: bool,
    pub microphone_active: bool,
}

impl AvState {
    pub fn any_active(&self) -> bool {
        self.camera_active || self.microphone_active
    }
}

#[derive(Clone)]
pub struct AvPresenceGate {
    camera: Arc<dyn DeviceProvider>,
    microphone: Arc<dyn DeviceProvider>,
}

impl AvPresenceGate {
    pub fn new(camera: Arc<dyn DeviceProvider>, microphone: Arc<dyn DeviceProvider>) -> Self {
        Self { camera, microphone }
    }

    fn provider(&self, kind: DeviceKind) -> &Arc<dyn DeviceProvider> {
        match kind {
            DeviceKind::Camera => &self.camera,
            DeviceKind::Microphone => &self.microphone,
        }
    }

    /// Whether any device of `kind` is running. Enumeration failures count
    /// as "no device connected".
    pub fn is_active(&self, kind: DeviceKind) -> bool {
        match self.provider(kind).enumerate() {
            Ok(devices) => devices.iter().any(|d| d.is_running),
            Err(e) => {
                warn!(%kind, error = %e, "device enumeration failed, assuming none connected");
                false
            }
        }
    }

    pub fn current(&self) -> AvState {
        AvState {
            camera_active: self.is_active(DeviceKind::Camera),
            microphone_active: self.is_active(DeviceKind::Microphone),
        }
    }

    pub fn is_any_active(&self) -> bool {
        self.current().any_active()
    }

    /// Register listeners on every known device and return the combined
    /// stream. The registrations are released when the stream is dropped.
    pub fn listen(&self) -> AvStateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = AvStateStream {
            rx,
            _keepalive: tx.clone(),
            devices: HashMap::new(),
            latest: AvState::default(),
            registrations: Vec::new(),
            initial_pending: true,
        };

        for kind in [DeviceKind::Camera, DeviceKind::Microphone] {
            let provider = self.provider(kind).clone();
            let devices = match provider.enumerate() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!(%kind, error = %e, "device enumeration failed, assuming none connected");
                    continue;
                }
            };

            let mut registered = HashSet::new();
            for device in &devices {
                let tx = tx.clone();
                let id = device.id.clone();
                let callback: DeviceCallback = Arc::new(move |is_running| {
                    // The stream may already be gone; nothing to do then.
                    let _ = tx.send(DeviceSignal {
                        kind,
                        id: id.clone(),
                        is_running,
                    });
                });
                match provider.add_listener(&device.id, callback) {
                    Ok(()) => {
                        registered.insert(device.id.clone());
                        stream.registrations.push(Registration {
                            provider: provider.clone(),
                            id: device.id.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(%kind, device = %device.id, error = %e, "listener registration failed, ignoring device");
                    }
                }
            }

            // Re-read after registering so a change in between is not lost.
            let snapshot = provider.enumerate().unwrap_or(devices);
            let states = stream.devices.entry(kind).or_default();
            for device in snapshot {
                if registered.contains(&device.id) {
                    states.insert(device.id, device.is_running);
                }
            }
        }

        stream.recompute();
        debug!(
            registrations = stream.registrations.len(),
            camera = stream.latest.camera_active,
            microphone = stream.latest.microphone_active,
            "listening for AV device changes"
        );
        stream
    }

    /// Release every listener held by either provider.
    pub fn stop_listening(&self) {
        self.camera.stop_listening();
        self.microphone.stop_listening();
    }
}

struct DeviceSignal {
    kind: DeviceKind,
    id: String,
    is_running: bool,
}

struct Registration {
    provider: Arc<dyn DeviceProvider>,
    id: String,
}

/// Combined camera/microphone event stream.
///
/// Yields the current combined state first, then once per device callback.
/// Repeated identical states are delivered as-is; de-duplication is up to the
/// consumer.
pub struct AvStateStream {
    rx: mpsc::UnboundedReceiver<DeviceSignal>,
    // Held so `recv` never observes a closed channel.
    _keepalive: mpsc::UnboundedSender<DeviceSignal>,
    devices: HashMap<DeviceKind, BTreeMap<String, bool>>,
    latest: AvState,
    registrations: Vec<Registration>,
    initial_pending: bool,
}

impl AvStateStream {
    pub async fn next(&mut self) -> AvState {
        if self.initial_pending {
            self.initial_pending = false;
            return self.latest;
        }
        match self.rx.recv().await {
            Some(signal) => self.apply(signal),
            // Unreachable while `_keepalive` is held.
            None => std::future::pending::<()>().await,
        }
        self.latest
    }

    /// Apply every queued change without waiting and return the result.
    pub fn drain(&mut self) -> AvState {
        while let Ok(signal) = self.rx.try_recv() {
            self.apply(signal);
        }
        self.latest
    }

    pub fn latest(&self) -> AvState {
        self.latest
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    fn apply(&mut self, signal: DeviceSignal) {
        debug!(kind = %signal.kind, device = %signal.id, running = signal.is_running, "AV device changed");
        self.devices
            .entry(signal.kind)
            .or_default()
            .insert(signal.id, signal.is_running);
        self.recompute();
    }

    fn recompute(&mut self) {
        let any = |kind: DeviceKind| {
            self.devices
                .get(&kind)
                .is_some_and(|states| states.values().any(|running| *running))
        };
        self.latest = AvState {
            camera_active: any(DeviceKind::Camera),
            microphone_active: any(DeviceKind::Microphone),
        };
    }
}

impl Drop for AvStateStream {
    fn drop(&mut self) {
        for registration in self.registrations.drain(..) {
            registration.provider.remove_listener(&registration.id);
        }
    }
}

#[derive(Default)]
struct ManualDevices {
    devices: BTreeMap<String, bool>,
    listeners: HashMap<String, DeviceCallback>,
    refuse_listeners: HashSet<String>,
}

/// In-process [`DeviceProvider`] whose devices are switched programmatically.
#[derive(Default)]
pub struct ManualDeviceProvider {
    inner: Mutex<ManualDevices>,
}

impl ManualDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, id: impl Into<String>, is_running: bool) -> Self {
        self.add_device(id, is_running);
        self
    }

    pub fn add_device(&self, id: impl Into<String>, is_running: bool) {
        lock(&self.inner).devices.insert(id.into(), is_running);
    }

    /// Make `add_listener` fail for `id`.
    pub fn refuse_listener(&self, id: impl Into<String>) {
        lock(&self.inner).refuse_listeners.insert(id.into());
    }

    /// Switch a device and notify its listener, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] for an unknown id.
    pub fn set_running(&self, id: &str, is_running: bool) -> Result<(), DeviceError> {
        let callback = {
            let mut inner = lock(&self.inner);
            let state = inner
                .devices
                .get_mut(id)
                .ok_or_else(|| DeviceError::NotFound(id.to_string()))?;
            *state = is_running;
            inner.listeners.get(id).cloned()
        };
        // Called outside the lock so a callback may call back into us.
        if let Some(callback) = callback {
            callback(is_running);
        }
        Ok(())
    }

    /// Switch every known device.
    pub fn set_all_running(&self, is_running: bool) {
        let ids: Vec<String> = lock(&self.inner).devices.keys().cloned().collect();
        for id in ids {
            // Ids come from the map itself.
            let _ = self.set_running(&id, is_running);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

impl DeviceProvider for ManualDeviceProvider {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(lock(&self.inner)
            .devices
            .iter()
            .map(|(id, running)| DeviceInfo {
                id: id.clone(),
                is_running: *running,
            })
            .collect())
    }

    fn add_listener(&self, id: &str, callback: DeviceCallback) -> Result<(), DeviceError> {
        let mut inner = lock(&self.inner);
        if !inner.devices.contains_key(id) {
            return Err(DeviceError::NotFound(id.to_string()));
        }
        if inner.refuse_listeners.contains(id) {
            return Err(DeviceError::RegistrationFailed {
                id: id.to_string(),
                message: "refused".into(),
            });
        }
        inner.listeners.insert(id.to_string(), callback);
        Ok(())
    }

    fn remove_listener(&self, id: &str) {
        lock(&self.inner).listeners.remove(id);
    }

    fn stop_listening(&self) {
        lock(&self.inner).listeners.clear();
    }
}
