//! Read-only controller for the accessory-information service.

use hkhub_domain::accessory::{CharacteristicType, ServiceType};

use super::context::ControllerContext;
use crate::ports::AccessoryProtocol;

/// Identification strings published by the accessory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessoryInformation {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_revision: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccessoryInfoController {
    label: String,
    service_type: ServiceType,
    info: AccessoryInformation,
}

impl AccessoryInfoController {
    pub(crate) async fn build<P: AccessoryProtocol>(
        ctx: ControllerContext<P>,
        label: String,
    ) -> Self {
        let info = AccessoryInformation {
            name: read_text(&ctx, CharacteristicType::Name).await,
            manufacturer: read_text(&ctx, CharacteristicType::Manufacturer).await,
            model: read_text(&ctx, CharacteristicType::Model).await,
            serial_number: read_text(&ctx, CharacteristicType::SerialNumber).await,
            firmware_revision: read_text(&ctx, CharacteristicType::FirmwareRevision).await,
        };
        Self {
            label,
            service_type: ctx.service.service_type,
            info,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[must_use]
    pub fn info(&self) -> &AccessoryInformation {
        &self.info
    }
}

async fn read_text<P: AccessoryProtocol>(
    ctx: &ControllerContext<P>,
    kind: CharacteristicType,
) -> Option<String> {
    let characteristic = ctx.optional(&kind)?;
    ctx.current_value(&characteristic)
        .await
        .and_then(|value| value.as_str().map(ToString::to_string))
}
