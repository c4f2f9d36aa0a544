//! # hkhub-adapter-virtual
//!
//! Simulated accessory protocol for demos and end-to-end tests.
//!
//! ## Provided devices
//!
//! | Device id | Accessories |
//! |-----------|-------------|
//! | `0E:00:00:00:00:01` | Virtual Switch |
//! | `0E:00:00:00:00:02` | Virtual Light (int-valued `On`) |
//! | `0E:00:00:00:00:03` | Virtual Thermostat |
//! | `0E:00:00:00:00:04` | Bridge with a light and a thermostat |
//!
//! Devices keep their pairing and characteristic values in memory. Tests
//! can announce or lose devices, push remote value changes and inject
//! failures through [`Faults`].
//!
//! ## Dependency rule
//!
//! Depends on `hkhub-app` (port traits) and `hkhub-domain` only.

mod devices;
mod error;
mod tag_store;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hkhub_app::ports::{AccessoryProtocol, DiscoveryEvent, Notifications};
use hkhub_domain::accessory::Accessory;
use hkhub_domain::error::{ProtocolError, ProtocolOperation};
use hkhub_domain::id::{AccessoryId, DeviceId, InstanceId, SubscriptionId};
use hkhub_domain::setup_code::SetupCode;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::mpsc;

pub use devices::{VirtualDevice, demo_fleet, light_bulb, switch, thermostat};
pub use error::VirtualError;
pub use tag_store::InMemoryTagStore;

/// Failure injection knobs.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub reject_pair_setup: bool,
    pub reject_pair_verify: bool,
    pub reject_writes: bool,
    /// Delay applied before answering pair-verify.
    pub verify_delay: Option<Duration>,
}

struct SimulatedDevice {
    setup_code: SetupCode,
    accessories: Vec<Accessory>,
    values: HashMap<(AccessoryId, InstanceId), CharacteristicValue>,
    visible: bool,
    paired: bool,
    session: bool,
}

impl SimulatedDevice {
    fn new(device: VirtualDevice) -> Self {
        let values = device
            .accessories
            .iter()
            .flat_map(|accessory| {
                accessory.services.iter().flat_map(move |service| {
                    service.characteristics.iter().filter_map(move |c| {
                        c.value
                            .clone()
                            .map(|value| ((accessory.id, c.iid), value))
                    })
                })
            })
            .collect();
        Self {
            setup_code: device.setup_code,
            accessories: device.accessories,
            values,
            visible: true,
            paired: false,
            session: false,
        }
    }

    fn snapshot(&self) -> Vec<Accessory> {
        let mut accessories = self.accessories.clone();
        for accessory in &mut accessories {
            let aid = accessory.id;
            for characteristic in accessory
                .services
                .iter_mut()
                .flat_map(|service| service.characteristics.iter_mut())
            {
                if let Some(value) = self.values.get(&(aid, characteristic.iid)) {
                    characteristic.value = Some(value.clone());
                }
            }
        }
        accessories
    }
}

type Key = (DeviceId, AccessoryId, InstanceId);
type Listeners = HashMap<SubscriptionId, mpsc::UnboundedSender<CharacteristicValue>>;

/// In-memory [`AccessoryProtocol`] implementation.
#[derive(Default)]
pub struct VirtualProtocol {
    devices: Mutex<BTreeMap<DeviceId, SimulatedDevice>>,
    listeners: Mutex<HashMap<Key, Listeners>>,
    discovery: Mutex<Option<mpsc::UnboundedSender<DiscoveryEvent>>>,
    faults: Mutex<Faults>,
}

impl VirtualProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A protocol populated with [`demo_fleet`].
    #[must_use]
    pub fn with_demo_fleet(setup_code: &SetupCode) -> Self {
        let protocol = Self::new();
        for device in demo_fleet(setup_code) {
            protocol.add_device(device);
        }
        protocol
    }

    /// Register a device. It is visible immediately and announced if
    /// discovery is running.
    pub fn add_device(&self, device: VirtualDevice) {
        let id = device.id.clone();
        self.lock_devices()
            .insert(id.clone(), SimulatedDevice::new(device));
        self.send_discovery(DiscoveryEvent::Discovered { id, paired: false });
    }

    /// Pretend a pairing survived from an earlier run.
    pub fn set_paired(&self, id: &DeviceId, paired: bool) {
        if let Some(device) = self.lock_devices().get_mut(id) {
            device.paired = paired;
            if !paired {
                device.session = false;
            }
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    /// Make the device visible again and announce it.
    pub fn announce(&self, id: &DeviceId) {
        let paired = {
            let mut devices = self.lock_devices();
            let Some(device) = devices.get_mut(id) else {
                return;
            };
            device.visible = true;
            device.paired
        };
        self.send_discovery(DiscoveryEvent::Discovered {
            id: id.clone(),
            paired,
        });
    }

    /// Drop the device off the network. Its session ends.
    pub fn lose(&self, id: &DeviceId) {
        {
            let mut devices = self.lock_devices();
            let Some(device) = devices.get_mut(id) else {
                return;
            };
            device.visible = false;
            device.session = false;
        }
        self.send_discovery(DiscoveryEvent::Lost { id: id.clone() });
    }

    /// Change a value on the device itself and notify subscribers.
    pub fn remote_update(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        value: CharacteristicValue,
    ) {
        if let Some(device) = self.lock_devices().get_mut(id) {
            device.values.insert((aid, iid), value.clone());
        }
        let key = (id.clone(), aid, iid);
        let mut listeners = self.lock_listeners();
        if let Some(senders) = listeners.get_mut(&key) {
            // controllers dropped without unsubscribing
            senders.retain(|_, sender| !sender.is_closed());
            tracing::trace!(device_id = %id, %aid, %iid, count = senders.len(), "remote update");
            for sender in senders.values() {
                let _ = sender.send(value.clone());
            }
            if senders.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn value(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> Option<CharacteristicValue> {
        self.lock_devices()
            .get(id)?
            .values
            .get(&(aid, iid))
            .cloned()
    }

    #[must_use]
    pub fn is_paired(&self, id: &DeviceId) -> bool {
        self.lock_devices().get(id).is_some_and(|d| d.paired)
    }

    /// Number of live notification registrations across all devices.
    /// Registrations whose receiver is gone are not counted.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock_listeners()
            .values()
            .flat_map(HashMap::values)
            .filter(|sender| !sender.is_closed())
            .count()
    }

    fn send_discovery(&self, event: DiscoveryEvent) {
        let discovery = self.discovery.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = discovery.as_ref() {
            let _ = sender.send(event);
        }
    }

    fn faults(&self) -> Faults {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_devices(&self) -> MutexGuard<'_, BTreeMap<DeviceId, SimulatedDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<Key, Listeners>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a device with an open session.
    fn with_session<T>(
        &self,
        id: &DeviceId,
        operation: ProtocolOperation,
        f: impl FnOnce(&mut SimulatedDevice) -> Result<T, VirtualError>,
    ) -> Result<T, ProtocolError> {
        let mut devices = self.lock_devices();
        let device = devices
            .get_mut(id)
            .ok_or_else(|| VirtualError::UnknownDevice(id.clone()).into_protocol(operation))?;
        if !device.session {
            return Err(VirtualError::NoSession(id.clone()).into_protocol(operation));
        }
        f(device).map_err(|err| err.into_protocol(operation))
    }
}

impl AccessoryProtocol for VirtualProtocol {
    async fn start_discovery(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, ProtocolError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let devices = self.lock_devices();
            for (id, device) in devices.iter().filter(|(_, d)| d.visible) {
                let _ = sender.send(DiscoveryEvent::Discovered {
                    id: id.clone(),
                    paired: device.paired,
                });
            }
        }
        *self.discovery.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        tracing::debug!("virtual discovery started");
        Ok(receiver)
    }

    async fn pair_setup(&self, id: &DeviceId, code: &SetupCode) -> Result<(), ProtocolError> {
        let op = ProtocolOperation::PairSetup;
        let reject = self.faults().reject_pair_setup;
        let mut devices = self.lock_devices();
        let device = devices
            .get_mut(id)
            .ok_or_else(|| VirtualError::UnknownDevice(id.clone()).into_protocol(op))?;
        if reject || &device.setup_code != code {
            return Err(VirtualError::SetupCodeRejected.into_protocol(op));
        }
        device.paired = true;
        tracing::debug!(device_id = %id, "virtual pair-setup complete");
        Ok(())
    }

    async fn pair_verify(&self, id: &DeviceId) -> Result<(), ProtocolError> {
        let op = ProtocolOperation::PairVerify;
        let faults = self.faults();
        if let Some(delay) = faults.verify_delay {
            tokio::time::sleep(delay).await;
        }
        let mut devices = self.lock_devices();
        let device = devices
            .get_mut(id)
            .ok_or_else(|| VirtualError::UnknownDevice(id.clone()).into_protocol(op))?;
        if !device.paired {
            return Err(VirtualError::NotPaired(id.clone()).into_protocol(op));
        }
        if faults.reject_pair_verify {
            return Err(VirtualError::VerifyRejected.into_protocol(op));
        }
        device.session = true;
        Ok(())
    }

    async fn unpair(&self, id: &DeviceId) -> Result<(), ProtocolError> {
        {
            let mut devices = self.lock_devices();
            let device = devices.get_mut(id).ok_or_else(|| {
                VirtualError::UnknownDevice(id.clone()).into_protocol(ProtocolOperation::Unpair)
            })?;
            device.paired = false;
            device.session = false;
        }
        self.lock_listeners().retain(|(device, _, _), _| device != id);
        Ok(())
    }

    async fn accessories(&self, id: &DeviceId) -> Result<Vec<Accessory>, ProtocolError> {
        self.with_session(id, ProtocolOperation::ListAccessories, |device| {
            Ok(device.snapshot())
        })
    }

    async fn get_characteristic(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> Result<CharacteristicValue, ProtocolError> {
        self.with_session(id, ProtocolOperation::ReadCharacteristic, |device| {
            device
                .values
                .get(&(aid, iid))
                .cloned()
                .ok_or(VirtualError::UnknownCharacteristic { aid, iid })
        })
    }

    async fn put_characteristic(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        value: CharacteristicValue,
    ) -> Result<(), ProtocolError> {
        let reject = self.faults().reject_writes;
        self.with_session(id, ProtocolOperation::WriteCharacteristic, |device| {
            if reject {
                return Err(VirtualError::WriteRejected);
            }
            let slot = device
                .values
                .get_mut(&(aid, iid))
                .ok_or(VirtualError::UnknownCharacteristic { aid, iid })?;
            *slot = value;
            Ok(())
        })
    }

    async fn subscribe_to_events(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> Result<Notifications, ProtocolError> {
        self.with_session(id, ProtocolOperation::Subscribe, |device| {
            if device.values.contains_key(&(aid, iid)) {
                Ok(())
            } else {
                Err(VirtualError::UnknownCharacteristic { aid, iid })
            }
        })?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = SubscriptionId::new();
        self.lock_listeners()
            .entry((id.clone(), aid, iid))
            .or_default()
            .insert(subscription, sender);
        Ok(Notifications {
            id: subscription,
            receiver,
        })
    }

    async fn unsubscribe_from_events(
        &self,
        id: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        subscription: SubscriptionId,
    ) {
        let key = (id.clone(), aid, iid);
        let mut listeners = self.lock_listeners();
        if let Some(senders) = listeners.get_mut(&key) {
            senders.remove(&subscription);
            if senders.is_empty() {
                listeners.remove(&key);
            }
        }
    }
}
