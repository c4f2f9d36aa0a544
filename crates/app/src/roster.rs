//! Device roster: the single owner of live [`Device`] records.
//!
//! Every transition mutates the record under the roster lock, takes a
//! snapshot, releases the lock and only then broadcasts a
//! [`LifecycleEvent`]. Consumers can therefore call back into the roster
//! from their handlers without deadlocking.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hkhub_domain::accessory::Accessory;
use hkhub_domain::device::{CloseReason, Device};
use hkhub_domain::error::{HubError, NotFoundError};
use hkhub_domain::event::{LifecycleEvent, LifecycleKind};
use hkhub_domain::id::DeviceId;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Default capacity of the lifecycle broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Live set of known devices plus the lifecycle event fan-out.
#[derive(Debug)]
pub struct DeviceRoster {
    devices: Mutex<BTreeMap<DeviceId, Device>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl Default for DeviceRoster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl DeviceRoster {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            devices: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Receive every lifecycle event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Stream of lifecycle events of a single kind.
    ///
    /// Events dropped because the consumer lagged are logged and skipped.
    pub fn events(
        &self,
        kind: LifecycleKind,
    ) -> impl Stream<Item = LifecycleEvent> + Send + use<> {
        BroadcastStream::new(self.events.subscribe()).filter_map(move |item| match item {
            Ok(event) if event.kind == kind => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(%kind, skipped, "lifecycle consumer lagged");
                None
            }
        })
    }

    /// All known devices, ordered by id.
    #[must_use]
    pub fn get_devices(&self) -> Vec<Device> {
        self.lock().values().cloned().collect()
    }

    /// Devices with an established session.
    #[must_use]
    pub fn get_verified_devices(&self) -> Vec<Device> {
        self.lock()
            .values()
            .filter(|device| device.is_verified())
            .cloned()
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] if the device is not in the roster.
    pub fn get_device(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Record that discovery saw `id`. `paired` comes from the protocol's
    /// pairing store and overrides what the roster believed.
    pub fn on_discovered(&self, id: DeviceId, paired: bool) -> Device {
        let snapshot = {
            let mut devices = self.lock();
            let device = devices
                .entry(id.clone())
                .or_insert_with(|| Device::discovered(id, paired));
            device.discovered = true;
            device.paired = paired;
            if !paired {
                device.verified = false;
            }
            device.clone()
        };
        self.emit(LifecycleKind::Discovered, &snapshot);
        snapshot
    }

    /// Record that discovery lost `id`. Unpaired devices are forgotten,
    /// paired ones stay known but unreachable and need a fresh verify once
    /// they come back.
    pub fn on_lost(&self, id: &DeviceId) -> Option<Device> {
        let snapshot = {
            let mut devices = self.lock();
            let device = devices.get_mut(id)?;
            device.discovered = false;
            // the session does not survive leaving the network
            device.verified = false;
            device.verifying = false;
            let snapshot = device.clone();
            if !snapshot.paired {
                devices.remove(id);
            }
            snapshot
        };
        self.emit(LifecycleKind::Lost, &snapshot);
        Some(snapshot)
    }

    /// Mark a verify attempt as in flight.
    ///
    /// Returns `false` without changing anything when the device is already
    /// verified or another attempt is running.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] if the device is not in the roster.
    pub fn begin_verify(&self, id: &DeviceId) -> Result<bool, HubError> {
        let mut devices = self.lock();
        let device = devices.get_mut(id).ok_or_else(|| not_found(id))?;
        if device.verifying || device.is_verified() {
            return Ok(false);
        }
        device.verifying = true;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] if the device is not in the roster.
    pub fn mark_paired(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.transition(id, LifecycleKind::Paired, |device| {
            device.paired = true;
            device.close_reason = None;
        })
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] if the device is not in the roster.
    pub fn mark_verified(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.transition(id, LifecycleKind::Verified, |device| {
            device.paired = true;
            device.verified = true;
            device.verifying = false;
            device.close_reason = None;
        })
    }

    /// Replace the cached accessory list.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] if the device is not in the roster.
    pub fn set_accessories(
        &self,
        id: &DeviceId,
        accessories: Vec<Accessory>,
    ) -> Result<Device, HubError> {
        self.transition(id, LifecycleKind::AccessoriesUpdated, |device| {
            device.accessories = accessories;
        })
    }

    /// End the device's pairing and session.
    ///
    /// The device becomes unpaired and is forgotten if discovery no longer
    /// sees it. A `Closed` event is emitted either way.
    pub fn close(&self, id: &DeviceId, reason: CloseReason) -> Option<Device> {
        let snapshot = {
            let mut devices = self.lock();
            let device = devices.get_mut(id)?;
            device.paired = false;
            device.verified = false;
            device.verifying = false;
            device.accessories.clear();
            device.close_reason = Some(reason);
            let snapshot = device.clone();
            if !snapshot.discovered {
                devices.remove(id);
            }
            snapshot
        };
        self.emit(LifecycleKind::Closed, &snapshot);
        Some(snapshot)
    }

    fn transition(
        &self,
        id: &DeviceId,
        kind: LifecycleKind,
        apply: impl FnOnce(&mut Device),
    ) -> Result<Device, HubError> {
        let snapshot = {
            let mut devices = self.lock();
            let device = devices.get_mut(id).ok_or_else(|| not_found(id))?;
            apply(device);
            device.clone()
        };
        self.emit(kind, &snapshot);
        Ok(snapshot)
    }

    fn emit(&self, kind: LifecycleKind, device: &Device) {
        tracing::debug!(device_id = %device.id, %kind, "lifecycle transition");
        // no receivers is fine
        let _ = self.events.send(LifecycleEvent::new(kind, device.clone()));
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DeviceId, Device>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(id: &DeviceId) -> HubError {
    NotFoundError {
        entity: "Device",
        id: id.to_string(),
    }
    .into()
}
