//! Simulated accessories: switch, light bulb, thermostat.
//!
//! Every accessory carries an accessory-information service at iid 1 and
//! its main service at iid 10, with characteristics numbered from there.

mod light_bulb;
mod switch;
mod thermostat;

pub use light_bulb::light_bulb;
pub use switch::switch;
pub use thermostat::thermostat;

use hkhub_domain::accessory::{Accessory, Characteristic, CharacteristicType, Service, ServiceType};
use hkhub_domain::id::DeviceId;
use hkhub_domain::setup_code::SetupCode;

/// A simulated remote device and the accessories it exposes.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    pub id: DeviceId,
    pub setup_code: SetupCode,
    pub accessories: Vec<Accessory>,
}

impl VirtualDevice {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, setup_code: SetupCode) -> Self {
        Self {
            id: id.into(),
            setup_code,
            accessories: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_accessory(mut self, accessory: Accessory) -> Self {
        self.accessories.push(accessory);
        self
    }
}

/// Three standalone devices plus one bridge exposing a light and a
/// thermostat, all sharing `setup_code`.
#[must_use]
pub fn demo_fleet(setup_code: &SetupCode) -> Vec<VirtualDevice> {
    vec![
        VirtualDevice::new("0E:00:00:00:00:01", setup_code.clone())
            .with_accessory(switch(1, "Virtual Switch")),
        VirtualDevice::new("0E:00:00:00:00:02", setup_code.clone())
            .with_accessory(light_bulb(1, "Virtual Light")),
        VirtualDevice::new("0E:00:00:00:00:03", setup_code.clone())
            .with_accessory(thermostat(1, "Virtual Thermostat")),
        VirtualDevice::new("0E:00:00:00:00:04", setup_code.clone())
            .with_accessory(bridge(1, "Virtual Bridge"))
            .with_accessory(light_bulb(2, "Bridged Light"))
            .with_accessory(thermostat(3, "Bridged Thermostat")),
    ]
}

/// Accessory-information service for `name`.
pub(crate) fn information(name: &str, model: &str) -> Service {
    Service::new(1, ServiceType::AccessoryInformation)
        .with_characteristic(Characteristic::new(2, CharacteristicType::Name, name))
        .with_characteristic(Characteristic::new(
            3,
            CharacteristicType::Manufacturer,
            "hkhub",
        ))
        .with_characteristic(Characteristic::new(4, CharacteristicType::Model, model))
        .with_characteristic(Characteristic::new(
            5,
            CharacteristicType::SerialNumber,
            format!("{model}-{}", name.len()).as_str(),
        ))
        .with_characteristic(Characteristic::new(
            6,
            CharacteristicType::FirmwareRevision,
            "1.0.0",
        ))
}

/// A bridge accessory: only accessory-information, so no primary service.
fn bridge(aid: u64, name: &str) -> Accessory {
    Accessory::new(aid).with_service(information(name, "VBridge-1"))
}
