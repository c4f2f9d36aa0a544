//! Accessory capability model: accessories, services, characteristics.
//!
//! Field names follow the accessory protocol's JSON (`aid`, `iid`, `type`,
//! `primary`, `services`, `characteristics`, `value`) so a raw
//! `/accessories` document deserializes directly into [`Accessory`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{AccessoryId, InstanceId};
use crate::value::CharacteristicValue;

/// Suffix of the protocol's base UUID; full-form type ids end with it.
const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-0026BB765291";

/// Reduce `00000043-0000-1000-8000-0026BB765291` or `0043` to `43`.
fn short_code(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let head = upper.strip_suffix(BASE_UUID_SUFFIX).unwrap_or(&upper);
    let trimmed = head.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

macro_rules! hap_types {
    ($(#[doc = $doc:expr])* $name:ident { $($variant:ident => ($code:literal, $label:literal)),+ $(,)? }) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            /// A type this crate has no name for, kept as its short code.
            Other(String),
        }

        impl $name {
            /// Parse a short code or full base-UUID form.
            #[must_use]
            pub fn from_code(raw: &str) -> Self {
                let code = short_code(raw);
                match code.as_str() {
                    $($code => Self::$variant,)+
                    _ => Self::Other(code),
                }
            }

            /// The protocol's short type code (e.g. `43`).
            #[must_use]
            pub fn code(&self) -> &str {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Other(code) => code.as_str(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($label),)+
                    Self::Other(code) => write!(f, "unknown({code})"),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from_code(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.code().to_string()
            }
        }
    };
}

hap_types!(
    /// Capability tag of a [`Service`].
    ServiceType {
        AccessoryInformation => ("3E", "accessory-information"),
        Fan => ("40", "fan"),
        LightBulb => ("43", "light-bulb"),
        Outlet => ("47", "outlet"),
        Switch => ("49", "switch"),
        Thermostat => ("4A", "thermostat"),
        TemperatureSensor => ("8A", "temperature-sensor"),
        ProtocolInformation => ("A2", "protocol-information"),
    }
);

hap_types!(
    /// Semantic tag of a [`Characteristic`].
    CharacteristicType {
        Brightness => ("8", "brightness"),
        CoolingThresholdTemperature => ("D", "cooling-threshold-temperature"),
        CurrentHeatingCoolingState => ("F", "current-heating-cooling-state"),
        CurrentRelativeHumidity => ("10", "current-relative-humidity"),
        CurrentTemperature => ("11", "current-temperature"),
        HeatingThresholdTemperature => ("12", "heating-threshold-temperature"),
        Hue => ("13", "hue"),
        Identify => ("14", "identify"),
        Manufacturer => ("20", "manufacturer"),
        Model => ("21", "model"),
        Name => ("23", "name"),
        On => ("25", "on"),
        Saturation => ("2F", "saturation"),
        SerialNumber => ("30", "serial-number"),
        TargetHeatingCoolingState => ("33", "target-heating-cooling-state"),
        TargetRelativeHumidity => ("34", "target-relative-humidity"),
        TargetTemperature => ("35", "target-temperature"),
        TemperatureDisplayUnits => ("36", "temperature-display-units"),
        FirmwareRevision => ("52", "firmware-revision"),
        ColorTemperature => ("CE", "color-temperature"),
    }
);

/// A single readable/writable/notifiable value within a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub iid: InstanceId,
    #[serde(rename = "type")]
    pub characteristic_type: CharacteristicType,
    /// Value cached in the service description; may be stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CharacteristicValue>,
}

impl Characteristic {
    #[must_use]
    pub fn new(
        iid: u64,
        characteristic_type: CharacteristicType,
        value: impl Into<CharacteristicValue>,
    ) -> Self {
        Self {
            iid: InstanceId(iid),
            characteristic_type,
            value: Some(value.into()),
        }
    }
}

/// A capability grouping on an accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub iid: InstanceId,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    #[must_use]
    pub fn new(iid: u64, service_type: ServiceType) -> Self {
        Self {
            iid: InstanceId(iid),
            service_type,
            primary: None,
            characteristics: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    #[must_use]
    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Whether the service explicitly declares itself primary.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary == Some(true)
    }

    /// First characteristic of the given type.
    #[must_use]
    pub fn characteristic(&self, kind: &CharacteristicType) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| &c.characteristic_type == kind)
    }
}

/// A remote controllable unit exposing one or more services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessory {
    #[serde(rename = "aid")]
    pub id: AccessoryId,
    pub services: Vec<Service>,
}

impl Accessory {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id: AccessoryId(id),
            services: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// First service of the given type, in stored order.
    #[must_use]
    pub fn service(&self, kind: &ServiceType) -> Option<&Service> {
        self.services.iter().find(|s| &s.service_type == kind)
    }

    /// Display name from the accessory-information service, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.service(&ServiceType::AccessoryInformation)?
            .characteristic(&CharacteristicType::Name)?
            .value
            .as_ref()?
            .as_str()
    }

    /// Service that represents the accessory in summary views.
    ///
    /// The first service flagged `primary` wins; otherwise the first service
    /// that is not accessory-information. `None` when the accessory only
    /// carries accessory-information.
    #[must_use]
    pub fn primary_service(&self) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.is_primary())
            .or_else(|| {
                self.services
                    .iter()
                    .find(|s| s.service_type != ServiceType::AccessoryInformation)
            })
    }
}
