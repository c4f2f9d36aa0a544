//! Virtual switch: a single on/off characteristic.

use hkhub_domain::accessory::{Accessory, Characteristic, CharacteristicType, Service, ServiceType};

use super::information;

/// `On` is iid 11 and starts off.
#[must_use]
pub fn switch(aid: u64, name: &str) -> Accessory {
    Accessory::new(aid)
        .with_service(information(name, "VSwitch-1"))
        .with_service(
            Service::new(10, ServiceType::Switch)
                .primary(true)
                .with_characteristic(Characteristic::new(11, CharacteristicType::On, false)),
        )
}
