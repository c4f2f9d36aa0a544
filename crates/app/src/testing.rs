//! In-memory accessory protocol shared by the app-layer tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use hkhub_domain::accessory::{Accessory, Characteristic, CharacteristicType, Service, ServiceType};
use hkhub_domain::error::{ProtocolError, ProtocolOperation};
use hkhub_domain::id::{AccessoryId, DeviceId, InstanceId, SubscriptionId};
use hkhub_domain::setup_code::SetupCode;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::mpsc;

use crate::ports::{AccessoryProtocol, DiscoveryEvent, Notifications};

type Key = (AccessoryId, InstanceId);
type Listeners = HashMap<SubscriptionId, mpsc::UnboundedSender<CharacteristicValue>>;

#[derive(Default)]
pub(crate) struct FakeProtocol {
    accessories: Mutex<Vec<Accessory>>,
    values: Mutex<HashMap<Key, CharacteristicValue>>,
    listeners: Mutex<HashMap<Key, Listeners>>,
    writes: Mutex<Vec<(Key, CharacteristicValue)>>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) fail_subscribe: Mutex<Option<InstanceId>>,
}

impl FakeProtocol {
    pub(crate) fn with_accessories(accessories: Vec<Accessory>) -> Self {
        let fake = Self::default();
        {
            let mut values = fake.values.lock().unwrap();
            for accessory in &accessories {
                for service in &accessory.services {
                    for characteristic in &service.characteristics {
                        if let Some(value) = &characteristic.value {
                            values.insert((accessory.id, characteristic.iid), value.clone());
                        }
                    }
                }
            }
        }
        *fake.accessories.lock().unwrap() = accessories;
        fake
    }

    pub(crate) fn set(&self, aid: u64, iid: u64, value: CharacteristicValue) {
        self.values
            .lock()
            .unwrap()
            .insert((AccessoryId(aid), InstanceId(iid)), value);
    }

    /// Simulate a change made on the device itself.
    pub(crate) fn notify(&self, aid: u64, iid: u64, value: CharacteristicValue) {
        self.set(aid, iid, value.clone());
        let key = (AccessoryId(aid), InstanceId(iid));
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(senders) = listeners.get_mut(&key) {
            senders.retain(|_, sender| !sender.is_closed());
            for sender in senders.values() {
                let _ = sender.send(value.clone());
            }
            if senders.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    /// Registrations whose receiver is still alive.
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .values()
            .flat_map(HashMap::values)
            .filter(|sender| !sender.is_closed())
            .count()
    }

    /// Registrations still held, dead or alive.
    pub(crate) fn registration_count(&self) -> usize {
        self.listeners.lock().unwrap().values().map(HashMap::len).sum()
    }

    pub(crate) fn writes(&self) -> Vec<(Key, CharacteristicValue)> {
        self.writes.lock().unwrap().clone()
    }
}

impl AccessoryProtocol for FakeProtocol {
    async fn start_discovery(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, ProtocolError> {
        let (_sender, receiver) = mpsc::unbounded_channel();
        Ok(receiver)
    }

    async fn pair_setup(&self, _: &DeviceId, _: &SetupCode) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn pair_verify(&self, _: &DeviceId) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn unpair(&self, _: &DeviceId) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn accessories(&self, _: &DeviceId) -> Result<Vec<Accessory>, ProtocolError> {
        Ok(self.accessories.lock().unwrap().clone())
    }

    async fn get_characteristic(
        &self,
        _: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> Result<CharacteristicValue, ProtocolError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ProtocolError::new(
                ProtocolOperation::ReadCharacteristic,
                "device unreachable",
            ));
        }
        self.values
            .lock()
            .unwrap()
            .get(&(aid, iid))
            .cloned()
            .ok_or_else(|| ProtocolError::new(ProtocolOperation::ReadCharacteristic, "no value"))
    }

    async fn put_characteristic(
        &self,
        _: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        value: CharacteristicValue,
    ) -> Result<(), ProtocolError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProtocolError::new(
                ProtocolOperation::WriteCharacteristic,
                "write refused",
            ));
        }
        self.values.lock().unwrap().insert((aid, iid), value.clone());
        self.writes.lock().unwrap().push(((aid, iid), value));
        Ok(())
    }

    async fn subscribe_to_events(
        &self,
        _: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
    ) -> Result<Notifications, ProtocolError> {
        if *self.fail_subscribe.lock().unwrap() == Some(iid) {
            return Err(ProtocolError::new(ProtocolOperation::Subscribe, "not notifiable"));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();
        self.listeners
            .lock()
            .unwrap()
            .entry((aid, iid))
            .or_default()
            .insert(id, sender);
        Ok(Notifications { id, receiver })
    }

    async fn unsubscribe_from_events(
        &self,
        _: &DeviceId,
        aid: AccessoryId,
        iid: InstanceId,
        subscription: SubscriptionId,
    ) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(entry) = listeners.get_mut(&(aid, iid)) {
            entry.remove(&subscription);
            if entry.is_empty() {
                listeners.remove(&(aid, iid));
            }
        }
    }
}

pub(crate) fn info_service(name: &str) -> Service {
    Service::new(1, ServiceType::AccessoryInformation)
        .with_characteristic(Characteristic::new(2, CharacteristicType::Name, name))
        .with_characteristic(Characteristic::new(
            3,
            CharacteristicType::Manufacturer,
            "Acme",
        ))
}

pub(crate) fn switch_accessory(aid: u64) -> Accessory {
    Accessory::new(aid)
        .with_service(info_service("Desk Switch"))
        .with_service(
            Service::new(10, ServiceType::Switch)
                .with_characteristic(Characteristic::new(11, CharacteristicType::On, false)),
        )
}

pub(crate) fn light_accessory(aid: u64) -> Accessory {
    Accessory::new(aid)
        .with_service(info_service("Ceiling Light"))
        .with_service(
            Service::new(10, ServiceType::LightBulb)
                .primary(true)
                .with_characteristic(Characteristic::new(11, CharacteristicType::On, 1_i64))
                .with_characteristic(Characteristic::new(
                    12,
                    CharacteristicType::Brightness,
                    40_i64,
                )),
        )
}

pub(crate) fn thermostat_accessory(aid: u64) -> Accessory {
    Accessory::new(aid)
        .with_service(info_service("Hallway"))
        .with_service(
            Service::new(10, ServiceType::Thermostat)
                .with_characteristic(Characteristic::new(
                    11,
                    CharacteristicType::CurrentHeatingCoolingState,
                    1_i64,
                ))
                .with_characteristic(Characteristic::new(
                    12,
                    CharacteristicType::TargetHeatingCoolingState,
                    3_i64,
                ))
                .with_characteristic(Characteristic::new(
                    13,
                    CharacteristicType::CurrentTemperature,
                    19.5,
                ))
                .with_characteristic(Characteristic::new(
                    14,
                    CharacteristicType::TargetTemperature,
                    21.0,
                ))
                .with_characteristic(Characteristic::new(
                    15,
                    CharacteristicType::TemperatureDisplayUnits,
                    0_i64,
                ))
                .with_characteristic(Characteristic::new(
                    16,
                    CharacteristicType::CurrentRelativeHumidity,
                    45.0,
                )),
        )
}
