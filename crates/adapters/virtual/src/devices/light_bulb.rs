//! Virtual light bulb: on/off, brightness and colour.
//!
//! The on state is reported as an integer, like many real bulbs do.

use hkhub_domain::accessory::{Accessory, Characteristic, CharacteristicType, Service, ServiceType};

use super::information;

/// `On` 11, `Brightness` 12, `Hue` 13, `Saturation` 14.
#[must_use]
pub fn light_bulb(aid: u64, name: &str) -> Accessory {
    Accessory::new(aid)
        .with_service(information(name, "VLight-1"))
        .with_service(
            Service::new(10, ServiceType::LightBulb)
                .with_characteristic(Characteristic::new(11, CharacteristicType::On, 0_i64))
                .with_characteristic(Characteristic::new(
                    12,
                    CharacteristicType::Brightness,
                    100_i64,
                ))
                .with_characteristic(Characteristic::new(13, CharacteristicType::Hue, 30.0))
                .with_characteristic(Characteristic::new(
                    14,
                    CharacteristicType::Saturation,
                    20.0,
                )),
        )
}
