//! Virtual thermostat: heating in auto mode at 21 °C.

use hkhub_domain::accessory::{Accessory, Characteristic, CharacteristicType, Service, ServiceType};

use super::information;

/// Required characteristics at iids 11..=15, humidity at 16 and 17.
#[must_use]
pub fn thermostat(aid: u64, name: &str) -> Accessory {
    Accessory::new(aid)
        .with_service(information(name, "VTherm-1"))
        .with_service(
            Service::new(10, ServiceType::Thermostat)
                .primary(true)
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
                    40.0,
                ))
                .with_characteristic(Characteristic::new(
                    17,
                    CharacteristicType::TargetRelativeHumidity,
                    45.0,
                )),
        )
}
